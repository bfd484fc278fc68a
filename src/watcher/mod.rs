//! Watcher module
//!
//! Spawns one watch task per tracked resource kind and funnels their
//! notifications into a single event channel. Cluster Event objects are
//! audit-only: they are turned into [`AuditRecord`]s and never become
//! graph notifications.

use crate::audit::AuditRecord;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Event, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service,
    ServiceAccount,
};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notification emitted by the watch tasks
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Resource was added or updated: (kind, namespace, name)
    Applied(String, String, String),
    /// Resource was deleted: (kind, namespace, name)
    Deleted(String, String, String),
    /// A cluster Event object, routed to the audit log only
    Audit(AuditRecord),
    /// Watch error occurred
    Error(String),
}

/// Manages the per-kind watch tasks feeding the incremental applier
pub struct ClusterWatcher {
    client: Client,
    event_tx: mpsc::UnboundedSender<WatchEvent>,
    handles: Vec<JoinHandle<()>>,
}

impl ClusterWatcher {
    pub fn new(client: Client) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                event_tx: tx,
                handles: Vec::new(),
            },
            rx,
        )
    }

    /// Start watching one resource type across all namespaces
    pub fn watch<K>(&mut self, kind: &'static str)
    where
        K: kube::Resource<DynamicType = ()>
            + Clone
            + std::fmt::Debug
            + serde::de::DeserializeOwned
            + Send
            + 'static,
    {
        let client = self.client.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let api: Api<K> = Api::all(client);
            let mut stream = Box::pin(watcher(api, watcher::Config::default()));
            let mut error_count = 0u32;
            const MAX_CONSECUTIVE_ERRORS: u32 = 5;

            while let Some(event) = stream.next().await {
                match event {
                    Ok(watcher::Event::InitApply(obj)) | Ok(watcher::Event::Apply(obj)) => {
                        error_count = 0;
                        let name = obj.name_any();
                        let ns = obj.namespace().unwrap_or_default();
                        let _ = event_tx.send(WatchEvent::Applied(kind.to_string(), ns, name));
                    }
                    Ok(watcher::Event::Delete(obj)) => {
                        error_count = 0;
                        let name = obj.name_any();
                        let ns = obj.namespace().unwrap_or_default();
                        let _ = event_tx.send(WatchEvent::Deleted(kind.to_string(), ns, name));
                    }
                    Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => {
                        error_count = 0;
                    }
                    Err(e) => {
                        error_count += 1;
                        // Only surface errors occasionally to avoid spam
                        if error_count == 1 || error_count.is_multiple_of(10) {
                            let _ = event_tx.send(WatchEvent::Error(format!(
                                "{} watcher error ({}): {}",
                                kind, error_count, e
                            )));
                        }
                        if error_count >= MAX_CONSECUTIVE_ERRORS {
                            let _ = event_tx.send(WatchEvent::Error(format!(
                                "{} watcher stopped after {} consecutive errors",
                                kind, error_count
                            )));
                            break;
                        }
                        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });

        self.handles.push(handle);
    }

    /// Watch cluster Event objects and forward them as audit records.
    ///
    /// Deletions of Event objects carry no audit value and are ignored.
    fn watch_events(&mut self) {
        let client = self.client.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let api: Api<Event> = Api::all(client);
            let mut stream = Box::pin(watcher(api, watcher::Config::default()));

            while let Some(event) = stream.next().await {
                match event {
                    Ok(watcher::Event::InitApply(ev)) | Ok(watcher::Event::Apply(ev)) => {
                        let _ = event_tx.send(WatchEvent::Audit(AuditRecord::from_event(&ev)));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(WatchEvent::Error(format!(
                            "Event watcher error: {}",
                            e
                        )));
                        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });

        self.handles.push(handle);
    }

    /// Start watching every tracked resource kind
    pub fn watch_all(&mut self) {
        self.watch::<Pod>("Pod");
        self.watch::<Deployment>("Deployment");
        self.watch::<ReplicaSet>("ReplicaSet");
        self.watch::<Service>("Service");
        self.watch::<Ingress>("Ingress");
        self.watch::<NetworkPolicy>("NetworkPolicy");
        self.watch::<PersistentVolumeClaim>("PVC");
        self.watch::<PersistentVolume>("PV");
        self.watch::<EndpointSlice>("EndpointSlice");
        self.watch::<DaemonSet>("DaemonSet");
        self.watch::<StatefulSet>("StatefulSet");
        self.watch::<Job>("Job");
        self.watch::<ConfigMap>("ConfigMap");
        self.watch::<Secret>("Secret");
        self.watch::<ServiceAccount>("ServiceAccount");
        self.watch_events();
    }

    /// Abort all watch tasks
    pub fn stop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.handles.clear();
    }
}
