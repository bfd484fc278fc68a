//! Cluster resource graph collector daemon
//!
//! Connects to a Kubernetes cluster, derives the resource relationship
//! graph, keeps it fresh from watch events and periodic re-collection, and
//! exports Mermaid/CSV snapshots on a debounced schedule.

use anyhow::{Context, Result};
use clap::Parser;
use kubegraph::audit::AuditLog;
use kubegraph::coalesce;
use kubegraph::collector::{Collector, EventKind};
use kubegraph::export::{FileSink, GraphSink};
use kubegraph::graph::Graph;
use kubegraph::kube::ResourceAccessor;
use kubegraph::watcher::{ClusterWatcher, WatchEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Kubernetes resource relationship graph collector
#[derive(Parser, Debug)]
#[command(name = "kubegraph")]
#[command(about = "Collects a Kubernetes resource relationship graph and exports it as Mermaid/CSV", long_about = None)]
struct Args {
    /// Explicit kubeconfig path (defaults to in-cluster, then KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Directory for exported graph files and the audit log
    #[arg(long, short = 'o', default_value = "artifacts")]
    output: PathBuf,

    /// Quiet period before an export, in seconds
    #[arg(long, default_value_t = 5)]
    debounce_secs: u64,

    /// Full re-collection interval in seconds (0 disables periodic resync)
    #[arg(long, default_value_t = 3600)]
    resync_secs: u64,

    /// Jaeger query base URL for service call edges (e.g. http://jaeger:16686)
    #[arg(long)]
    jaeger_url: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'd')]
    debug: bool,
}

/// Initialize logging to stderr, RUST_LOG overriding the default level
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .init();
}

fn snapshot(collector: &Collector) -> Graph {
    collector.graph().lock().unwrap().clone()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let client = match &args.kubeconfig {
        Some(path) => kubegraph::kube::create_client_from_kubeconfig_path(path).await?,
        None => kubegraph::kube::create_client().await?,
    };
    let accessor = ResourceAccessor::new(client.clone());
    accessor
        .probe()
        .await
        .context("Kubernetes API server is unreachable")?;
    tracing::info!("connected to Kubernetes API server");

    let audit_log = AuditLog::new(&args.output).context("Failed to create audit log")?;
    let sink: Arc<dyn GraphSink> = Arc::new(FileSink::new(args.output.clone()));
    let collector = Arc::new(Collector::new(accessor, args.jaeger_url.clone()));

    // Initial collection is fatal: without one successful pipeline run
    // there is no graph worth serving.
    let report = collector
        .run()
        .await
        .context("initial graph collection failed")?;
    tracing::info!(
        nodes = report.nodes,
        edges = report.edges,
        stages = report.stages.len(),
        "initial collection complete"
    );
    sink.export(&snapshot(&collector))
        .await
        .context("initial graph export failed")?;

    let (trigger, coalescer) = coalesce::channel(Duration::from_secs(args.debounce_secs));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (mut watcher, mut event_rx) = ClusterWatcher::new(client);
    watcher.watch_all();

    // Watch events refresh node identity and schedule an export; edges are
    // only recomputed by pipeline runs.
    let event_collector = Arc::clone(&collector);
    let event_trigger = trigger.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                WatchEvent::Applied(kind, ns, name) => {
                    event_collector.apply_event(&kind, EventKind::Updated, &ns, &name);
                    event_trigger.pulse();
                }
                WatchEvent::Deleted(kind, ns, name) => {
                    event_collector.apply_event(&kind, EventKind::Deleted, &ns, &name);
                    event_trigger.pulse();
                }
                WatchEvent::Audit(record) => {
                    if let Err(e) = audit_log.append(&record) {
                        tracing::warn!("failed to append audit record: {}", e);
                    }
                }
                WatchEvent::Error(msg) => {
                    tracing::warn!("{}", msg);
                }
            }
        }
    });

    if args.resync_secs > 0 {
        let resync_collector = Arc::clone(&collector);
        let resync_trigger = trigger.clone();
        let interval = Duration::from_secs(args.resync_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match resync_collector.run().await {
                    Ok(report) => {
                        tracing::info!(
                            nodes = report.nodes,
                            edges = report.edges,
                            "periodic re-collection complete"
                        );
                        resync_trigger.pulse();
                    }
                    Err(e) => {
                        tracing::error!("periodic re-collection failed: {}", e);
                    }
                }
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // Runs until shutdown, then performs one final export
    coalescer.run(collector.graph(), sink, shutdown_rx).await;

    watcher.stop();
    tracing::info!("shutdown complete");
    Ok(())
}
