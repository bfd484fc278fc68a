//! Graph collection
//!
//! The batch pipeline runs the relation-derivation stages against full
//! listings and atomically publishes the resulting graph; the incremental
//! applier keeps node identities fresh between pipeline runs.

pub mod selector;
pub mod stages;
mod update;

pub use update::{ApplyError, EventKind};

use crate::graph::{Graph, SharedGraph};
use crate::kube::ResourceLister;
use std::sync::Arc;
use thiserror::Error;

/// Explicit per-stage result, replacing implicit best-effort logging
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: &'static str,
    pub edges_added: usize,
}

impl StageOutcome {
    pub fn new(stage: &'static str, edges_added: usize) -> Self {
        Self { stage, edges_added }
    }
}

/// A stage-level listing failure
#[derive(Debug, Error)]
pub enum StageError {
    #[error("[{stage}] listing {kind} failed: {source}")]
    List {
        stage: &'static str,
        kind: &'static str,
        #[source]
        source: kube::Error,
    },
}

impl StageError {
    pub fn list(stage: &'static str, kind: &'static str, source: kube::Error) -> Self {
        StageError::List {
            stage,
            kind,
            source,
        }
    }

    /// API-level rejections (RBAC, missing CRD, bad request) degrade one
    /// stage; anything else means the apiserver itself is unreachable.
    pub fn is_connectivity(&self) -> bool {
        let StageError::List { source, .. } = self;
        !matches!(source, kube::Error::Api(_) | kube::Error::SerdeError(_))
    }

    fn into_source(self) -> kube::Error {
        let StageError::List { source, .. } = self;
        source
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The apiserver went away mid-run; the previously published graph
    /// stays authoritative.
    #[error("pipeline aborted, cluster unreachable: {0}")]
    Connectivity(#[source] kube::Error),
}

/// Summary of one full pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub stages: Vec<StageOutcome>,
    pub nodes: usize,
    pub edges: usize,
}

/// Owns the shared graph and drives both freshness tiers.
///
/// Relation edges come exclusively from [`Collector::run`]; watch events
/// applied through [`Collector::apply_event`] only refresh node identity.
pub struct Collector {
    lister: Box<dyn ResourceLister>,
    graph: SharedGraph,
    jaeger_url: Option<String>,
}

impl Collector {
    pub fn new(lister: impl ResourceLister + 'static, jaeger_url: Option<String>) -> Self {
        Self {
            lister: Box::new(lister),
            graph: Arc::new(std::sync::Mutex::new(Graph::new())),
            jaeger_url,
        }
    }

    /// Handle to the live shared graph
    pub fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    /// Run every derivation stage into a private graph and publish it.
    ///
    /// A stage whose listing fails at the API level is skipped with a
    /// warning and contributes zero edges; a connectivity-class failure
    /// aborts the run without touching the shared graph.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let mut g = Graph::new();
        let mut outcomes = Vec::new();
        let lister = self.lister.as_ref();

        Self::note(stages::workload_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::ingress_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::endpoint_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::controller_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::pvc_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::netpol_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::job_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::config_secret_stage(lister, &mut g).await, &mut outcomes)?;
        Self::note(stages::service_account_stage(lister, &mut g).await, &mut outcomes)?;

        if let Some(url) = &self.jaeger_url {
            let outcome = stages::jaeger_stage(url, &mut g).await;
            tracing::info!(stage = outcome.stage, edges_added = outcome.edges_added, "stage complete");
            outcomes.push(outcome);
        }

        let report = RunReport {
            stages: outcomes,
            nodes: g.node_count(),
            edges: g.edge_count(),
        };

        // Publish atomically; readers either see the old graph or this one
        *self.graph.lock().unwrap() = g;

        Ok(report)
    }

    fn note(
        result: Result<StageOutcome, StageError>,
        outcomes: &mut Vec<StageOutcome>,
    ) -> Result<(), PipelineError> {
        match result {
            Ok(outcome) => {
                tracing::info!(
                    stage = outcome.stage,
                    edges_added = outcome.edges_added,
                    "stage complete"
                );
                outcomes.push(outcome);
                Ok(())
            }
            Err(e) if e.is_connectivity() => Err(PipelineError::Connectivity(e.into_source())),
            Err(e) => {
                tracing::warn!("{}; stage contributes no edges", e);
                Ok(())
            }
        }
    }

    /// Apply a single watch notification to the live graph.
    ///
    /// Node identity only: added/updated objects are upserted, deleted
    /// objects cascade out. Derived relation edges are *not* recomputed
    /// here; they stay as of the last pipeline run until the next one.
    /// Malformed notifications are logged and dropped.
    pub fn apply_event(&self, kind: &str, event: EventKind, namespace: &str, name: &str) {
        let mut g = self.graph.lock().unwrap();
        if let Err(e) = update::apply(&mut g, kind, event, namespace, name) {
            tracing::warn!("dropped watch event: {}", e);
        }
    }
}
