//! Graph export sinks
//!
//! A sink consumes a graph snapshot and must upsert idempotently: nodes
//! keyed by UID, edges keyed by (from, to, kind). Repeated identical
//! exports and edges whose endpoint node is momentarily absent must both
//! be tolerated.

mod flat;

pub use flat::{FileSink, render_edges_csv, render_mermaid, render_nodes_csv};

use crate::graph::Graph;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Consumer of graph snapshots.
///
/// Export failures are logged and the cycle is considered failed; there is
/// no retry queue, the next successful cycle self-heals.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn export(&self, graph: &Graph) -> Result<(), ExportError>;
}
