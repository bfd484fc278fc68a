//! Debounced export scheduling
//!
//! Graph mutations arrive in bursts (a rollout touches dozens of objects
//! in under a second). Rather than export per mutation, change signals are
//! coalesced through a capacity-1 channel and a quiet-period timer, so a
//! burst costs one export.

use crate::export::GraphSink;
use crate::graph::{Graph, SharedGraph};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Build a connected trigger/coalescer pair with the given quiet period
pub fn channel(debounce: Duration) -> (Trigger, Coalescer) {
    let (tx, rx) = mpsc::channel(1);
    (Trigger { tx }, Coalescer { rx, debounce })
}

/// Cheap, clonable handle used by producers to signal "the graph changed".
///
/// Signals carry no payload. When one is already pending the new one is
/// dropped, which is fine: a pending signal already guarantees an export
/// that will pick up this change too.
#[derive(Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    pub fn pulse(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Consumes change signals and drives the sink.
///
/// Exports run one at a time on this task, so they never overlap. Each
/// export works on a snapshot taken under the graph lock; concurrent
/// mutations during the export land in the next cycle.
pub struct Coalescer {
    rx: mpsc::Receiver<()>,
    debounce: Duration,
}

impl Coalescer {
    /// Run until shutdown is signaled (or every trigger is dropped),
    /// then perform exactly one final export so nothing observed before
    /// shutdown is lost.
    pub async fn run(
        mut self,
        graph: SharedGraph,
        sink: Arc<dyn GraphSink>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                signal = self.rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    // Quiet period: every further signal restarts the timer.
                    // Shutdown or losing every trigger ends the loop; either
                    // way the flush below is the one final export.
                    let stopping = loop {
                        tokio::select! {
                            _ = shutdown.changed() => break true,
                            _ = tokio::time::sleep(self.debounce) => break false,
                            more = self.rx.recv() => {
                                if more.is_none() {
                                    break true;
                                }
                            }
                        }
                    };
                    Self::export(&graph, sink.as_ref()).await;
                    if stopping {
                        return;
                    }
                }
            }
        }

        Self::export(&graph, sink.as_ref()).await;
    }

    async fn export(graph: &SharedGraph, sink: &dyn GraphSink) {
        // Snapshot under the lock so the export never holds it across I/O
        let snapshot: Graph = graph.lock().unwrap().clone();
        tracing::debug!(
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            "exporting graph snapshot"
        );
        if let Err(e) = sink.export(&snapshot).await {
            tracing::error!("graph export failed: {}", e);
        }
    }
}
