//! Cluster resource graph collector library
//!
//! Builds and maintains a directed multigraph of Kubernetes resources and
//! their relationships (ownership, routing, storage binding, config reads,
//! network policy, identity), exported as Mermaid and CSV files.
//!
//! Edges are derived exclusively by the batch pipeline in [`collector`];
//! the watch-driven incremental path only keeps node identities fresh
//! between pipeline runs.

pub mod audit;
pub mod coalesce;
pub mod collector;
pub mod export;
pub mod graph;
pub mod kube;
pub mod watcher;

// Re-export commonly used types for convenience
pub use collector::{Collector, EventKind, PipelineError, RunReport, StageOutcome};
pub use export::{FileSink, GraphSink};
pub use graph::{EdgeKind, Graph, SharedGraph, safe_id};
pub use watcher::{ClusterWatcher, WatchEvent};
