//! Kubernetes client module
//!
//! Handles connection to the Kubernetes API server and provides
//! a configured client for use throughout the application.

mod accessor;

pub use accessor::{ResourceAccessor, ResourceLister};

#[cfg(test)]
pub use accessor::MockResourceLister;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;

/// Initialize and return a Kubernetes client
///
/// Uses the default kubeconfig loading strategy:
/// 1. In-cluster config (if running in a pod)
/// 2. KUBECONFIG environment variable
/// 3. ~/.kube/config
pub async fn create_client() -> Result<Client> {
    let config = Config::infer()
        .await
        .context("Failed to infer Kubernetes configuration")?;
    let client = Client::try_from(config)?;
    Ok(client)
}

/// Create a client from an explicit kubeconfig file path
pub async fn create_client_from_kubeconfig_path(path: &Path) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read kubeconfig: {}", path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to build client configuration from kubeconfig")?;
    let client = Client::try_from(config)?;
    Ok(client)
}
