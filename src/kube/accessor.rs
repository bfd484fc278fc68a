//! Typed listing layer over the Kubernetes API
//!
//! The collector stages consume full listings per kind; this wrapper keeps
//! the `Api` plumbing in one place and returns plain item vectors. Stages
//! depend on the [`ResourceLister`] trait so derivation can be driven from
//! canned listings in tests.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use kube::api::ListParams;
use kube::{Api, Client};

/// Cluster-wide list access, one method per kind the stages consume
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn deployments(&self) -> kube::Result<Vec<Deployment>>;
    async fn replica_sets(&self) -> kube::Result<Vec<ReplicaSet>>;
    async fn daemon_sets(&self) -> kube::Result<Vec<DaemonSet>>;
    async fn stateful_sets(&self) -> kube::Result<Vec<StatefulSet>>;
    async fn jobs(&self) -> kube::Result<Vec<Job>>;
    async fn pods(&self) -> kube::Result<Vec<Pod>>;
    async fn services(&self) -> kube::Result<Vec<Service>>;
    async fn ingresses(&self) -> kube::Result<Vec<Ingress>>;
    async fn network_policies(&self) -> kube::Result<Vec<NetworkPolicy>>;
    async fn endpoint_slices(&self) -> kube::Result<Vec<EndpointSlice>>;
    async fn persistent_volume_claims(&self) -> kube::Result<Vec<PersistentVolumeClaim>>;
    async fn persistent_volumes(&self) -> kube::Result<Vec<PersistentVolume>>;
}

/// [`ResourceLister`] backed by a live cluster connection
#[derive(Clone)]
pub struct ResourceAccessor {
    client: Client,
}

impl ResourceAccessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Check apiserver reachability. Used at startup and to distinguish
    /// a dead connection from a single failed list.
    pub async fn probe(&self) -> kube::Result<()> {
        self.client.apiserver_version().await?;
        Ok(())
    }

    async fn list_all<K>(&self) -> kube::Result<Vec<K>>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[async_trait]
impl ResourceLister for ResourceAccessor {
    async fn deployments(&self) -> kube::Result<Vec<Deployment>> {
        self.list_all().await
    }

    async fn replica_sets(&self) -> kube::Result<Vec<ReplicaSet>> {
        self.list_all().await
    }

    async fn daemon_sets(&self) -> kube::Result<Vec<DaemonSet>> {
        self.list_all().await
    }

    async fn stateful_sets(&self) -> kube::Result<Vec<StatefulSet>> {
        self.list_all().await
    }

    async fn jobs(&self) -> kube::Result<Vec<Job>> {
        self.list_all().await
    }

    async fn pods(&self) -> kube::Result<Vec<Pod>> {
        self.list_all().await
    }

    async fn services(&self) -> kube::Result<Vec<Service>> {
        self.list_all().await
    }

    async fn ingresses(&self) -> kube::Result<Vec<Ingress>> {
        self.list_all().await
    }

    async fn network_policies(&self) -> kube::Result<Vec<NetworkPolicy>> {
        self.list_all().await
    }

    async fn endpoint_slices(&self) -> kube::Result<Vec<EndpointSlice>> {
        self.list_all().await
    }

    async fn persistent_volume_claims(&self) -> kube::Result<Vec<PersistentVolumeClaim>> {
        self.list_all().await
    }

    async fn persistent_volumes(&self) -> kube::Result<Vec<PersistentVolume>> {
        self.list_all().await
    }
}
