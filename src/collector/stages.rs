//! Relation-derivation stages
//!
//! Each stage lists one or more resource kinds and derives a single relation
//! domain into the graph being built. The derivation logic itself is kept in
//! plain functions over listings so it can be exercised without a cluster;
//! the `*_stage` wrappers do the listing and report an explicit outcome.

use super::selector::{select_pods, select_pods_by_labels, selector_is_empty};
use super::{StageError, StageOutcome};
use crate::graph::{EdgeKind, Graph};
use crate::kube::ResourceLister;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use std::collections::HashMap;

fn name(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

fn namespace(meta: &ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or_default()
}

/// Deployment -> ReplicaSet (owner reference) -> Pod (ReplicaSet selector)
pub fn derive_ownership(
    deployments: &[Deployment],
    replica_sets: &[ReplicaSet],
    pods: &[Pod],
    g: &mut Graph,
) {
    for dp in deployments {
        let dp_ns = namespace(&dp.metadata);
        let dp_name = name(&dp.metadata);
        let dp_uid = g.add_node(dp_ns, dp_name, "Deployment");

        for rs in replica_sets {
            if namespace(&rs.metadata) != dp_ns {
                continue;
            }
            let owned = rs
                .metadata
                .owner_references
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|o| o.kind == "Deployment" && o.name == dp_name);
            if !owned {
                continue;
            }

            let rs_uid = g.add_node(dp_ns, name(&rs.metadata), "ReplicaSet");
            g.add_edge(&dp_uid, &rs_uid, EdgeKind::Owns);

            let selector = rs.spec.as_ref().map(|s| &s.selector);
            for pod in select_pods(pods, selector) {
                if namespace(&pod.metadata) != dp_ns {
                    continue;
                }
                let pod_uid = g.add_node(dp_ns, name(&pod.metadata), "Pod");
                g.add_edge(&rs_uid, &pod_uid, EdgeKind::Owns);
            }
        }
    }
}

/// Service -> Pod routing via spec.selector; an empty or absent selector
/// routes to every pod in the service's namespace
pub fn derive_service_routes(services: &[Service], pods: &[Pod], g: &mut Graph) {
    for svc in services {
        let svc_ns = namespace(&svc.metadata);
        let svc_uid = g.add_node(svc_ns, name(&svc.metadata), "Service");

        let selector = svc.spec.as_ref().and_then(|s| s.selector.as_ref());
        for pod in select_pods_by_labels(pods, selector) {
            if namespace(&pod.metadata) != svc_ns {
                continue;
            }
            let pod_uid = g.add_node(svc_ns, name(&pod.metadata), "Pod");
            g.add_edge(&svc_uid, &pod_uid, EdgeKind::Routes);
        }
    }
}

/// Ingress -> Service routing from defaultBackend and every rule path
pub fn derive_ingress_routes(ingresses: &[Ingress], g: &mut Graph) {
    for ing in ingresses {
        let ing_ns = namespace(&ing.metadata);
        let ing_uid = g.add_node(ing_ns, name(&ing.metadata), "Ingress");

        let Some(spec) = &ing.spec else { continue };

        if let Some(svc) = spec.default_backend.as_ref().and_then(|b| b.service.as_ref()) {
            let svc_uid = g.add_node(ing_ns, &svc.name, "Service");
            g.add_edge(&ing_uid, &svc_uid, EdgeKind::Routes);
        }

        for rule in spec.rules.as_deref().unwrap_or_default() {
            let Some(http) = &rule.http else { continue };
            for path in &http.paths {
                if let Some(svc) = &path.backend.service {
                    let svc_uid = g.add_node(ing_ns, &svc.name, "Service");
                    g.add_edge(&ing_uid, &svc_uid, EdgeKind::Routes);
                }
            }
        }
    }
}

/// EndpointSlice -> Pod targeting. An explicit targetRef of kind Pod wins;
/// otherwise endpoints are resolved by reverse IP lookup over pod status IPs.
pub fn derive_endpoint_targets(slices: &[EndpointSlice], pods: &[Pod], g: &mut Graph) {
    let mut ip_map: HashMap<&str, &Pod> = HashMap::new();
    for pod in pods {
        let Some(status) = &pod.status else { continue };
        for pod_ip in status.pod_ips.as_deref().unwrap_or_default() {
            ip_map.insert(pod_ip.ip.as_str(), pod);
        }
        if let Some(ip) = status.pod_ip.as_deref() {
            if !ip.is_empty() {
                ip_map.insert(ip, pod);
            }
        }
    }

    for slice in slices {
        let es_ns = namespace(&slice.metadata);
        let es_uid = g.add_node(es_ns, name(&slice.metadata), "EndpointSlice");

        for endpoint in &slice.endpoints {
            if let Some(target) = &endpoint.target_ref {
                if target.kind.as_deref() == Some("Pod") {
                    let pod_name = target.name.as_deref().unwrap_or_default();
                    let pod_uid = g.add_node(es_ns, pod_name, "Pod");
                    g.add_edge(&es_uid, &pod_uid, EdgeKind::Targets);
                    continue;
                }
            }
            for addr in &endpoint.addresses {
                if let Some(pod) = ip_map.get(addr.as_str()) {
                    let pod_uid = g.add_node(namespace(&pod.metadata), name(&pod.metadata), "Pod");
                    g.add_edge(&es_uid, &pod_uid, EdgeKind::Targets);
                }
            }
        }
    }
}

/// DaemonSet/StatefulSet -> Pod ownership via the controller's selector
pub fn derive_controller_ownership(
    daemon_sets: &[DaemonSet],
    stateful_sets: &[StatefulSet],
    pods: &[Pod],
    g: &mut Graph,
) {
    for ds in daemon_sets {
        let ds_ns = namespace(&ds.metadata);
        let ds_uid = g.add_node(ds_ns, name(&ds.metadata), "DaemonSet");
        for pod in select_pods(pods, ds.spec.as_ref().map(|s| &s.selector)) {
            if namespace(&pod.metadata) != ds_ns {
                continue;
            }
            let pod_uid = g.add_node(ds_ns, name(&pod.metadata), "Pod");
            g.add_edge(&ds_uid, &pod_uid, EdgeKind::Owns);
        }
    }

    for sts in stateful_sets {
        let sts_ns = namespace(&sts.metadata);
        let sts_uid = g.add_node(sts_ns, name(&sts.metadata), "StatefulSet");
        for pod in select_pods(pods, sts.spec.as_ref().map(|s| &s.selector)) {
            if namespace(&pod.metadata) != sts_ns {
                continue;
            }
            let pod_uid = g.add_node(sts_ns, name(&pod.metadata), "Pod");
            g.add_edge(&sts_uid, &pod_uid, EdgeKind::Owns);
        }
    }
}

/// Job -> Pod ownership via the job's selector
pub fn derive_job_ownership(jobs: &[Job], pods: &[Pod], g: &mut Graph) {
    for job in jobs {
        let job_ns = namespace(&job.metadata);
        let job_uid = g.add_node(job_ns, name(&job.metadata), "Job");
        let selector = job.spec.as_ref().and_then(|s| s.selector.as_ref());
        for pod in select_pods(pods, selector) {
            if namespace(&pod.metadata) != job_ns {
                continue;
            }
            let pod_uid = g.add_node(job_ns, name(&pod.metadata), "Pod");
            g.add_edge(&job_uid, &pod_uid, EdgeKind::Owns);
        }
    }
}

/// PVC -> PV -> StorageClass bindings.
///
/// Only Bound claims whose volumeName resolves in the PV index produce
/// edges; the PV always links to a StorageClass node, using the literal
/// `"none"` when the class name is empty. PV and StorageClass are
/// cluster-scoped, so their nodes carry an empty namespace.
pub fn derive_bindings(
    claims: &[PersistentVolumeClaim],
    volumes: &[PersistentVolume],
    g: &mut Graph,
) {
    let pv_index: HashMap<&str, &PersistentVolume> = volumes
        .iter()
        .map(|pv| (name(&pv.metadata), pv))
        .collect();

    for pvc in claims {
        let phase = pvc
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or_default();
        if phase != "Bound" {
            continue;
        }

        let pvc_uid = g.add_node(namespace(&pvc.metadata), name(&pvc.metadata), "PVC");
        let volume_name = pvc
            .spec
            .as_ref()
            .and_then(|s| s.volume_name.as_deref())
            .unwrap_or_default();
        let Some(pv) = pv_index.get(volume_name) else {
            continue;
        };

        let pv_uid = g.add_node("", name(&pv.metadata), "PV");
        g.add_edge(&pvc_uid, &pv_uid, EdgeKind::Binds);

        let mut sc = pv
            .spec
            .as_ref()
            .and_then(|s| s.storage_class_name.as_deref())
            .unwrap_or_default();
        if sc.is_empty() {
            sc = "none";
        }
        let sc_uid = g.add_node("", sc, "StorageClass");
        g.add_edge(&pv_uid, &sc_uid, EdgeKind::Uses);
    }
}

/// NetworkPolicy ingress allow-graph.
///
/// Target set falls back to all pods when the policy selector is empty or
/// matches nothing. A from-peer with a nil/empty pod selector widens the
/// source set to all pods. Policies with zero ingress rules contribute no
/// edges.
pub fn derive_policy_allow(policies: &[NetworkPolicy], pods: &[Pod], g: &mut Graph) {
    for np in policies {
        let Some(spec) = &np.spec else { continue };

        let mut targets = select_pods(pods, spec.pod_selector.as_ref());
        if spec.pod_selector.as_ref().is_none_or(selector_is_empty) || targets.is_empty() {
            targets = pods.iter().collect();
        }

        for rule in spec.ingress.as_deref().unwrap_or_default() {
            let mut sources: Vec<&Pod> = Vec::new();
            match rule.from.as_deref() {
                None | Some([]) => sources = pods.iter().collect(),
                Some(peers) => {
                    for peer in peers {
                        match &peer.pod_selector {
                            None => {
                                sources = pods.iter().collect();
                                break;
                            }
                            Some(sel) if selector_is_empty(sel) => {
                                sources = pods.iter().collect();
                                break;
                            }
                            Some(sel) => sources.extend(select_pods(pods, Some(sel))),
                        }
                    }
                }
            }

            // Dedupe by name; a pod reached through several peers still
            // contributes one source
            let mut unique: HashMap<&str, &Pod> = HashMap::new();
            for pod in sources {
                unique.insert(name(&pod.metadata), pod);
            }

            for source in unique.values() {
                let src_uid =
                    g.add_node(namespace(&source.metadata), name(&source.metadata), "Pod");
                for target in &targets {
                    let tgt_uid =
                        g.add_node(namespace(&target.metadata), name(&target.metadata), "Pod");
                    g.add_edge(&src_uid, &tgt_uid, EdgeKind::Allow);
                }
            }
        }
    }
}

/// Pod -> ConfigMap/Secret consumption: envFrom references read, volume
/// references mount
pub fn derive_config_reads(pods: &[Pod], g: &mut Graph) {
    for pod in pods {
        let pod_ns = namespace(&pod.metadata);
        let pod_uid = g.add_node(pod_ns, name(&pod.metadata), "Pod");
        let Some(spec) = &pod.spec else { continue };

        for container in &spec.containers {
            for env_from in container.env_from.as_deref().unwrap_or_default() {
                if let Some(cm) = &env_from.config_map_ref {
                    let cm_uid = g.add_node(pod_ns, &cm.name, "ConfigMap");
                    g.add_edge(&pod_uid, &cm_uid, EdgeKind::Reads);
                }
                if let Some(sec) = &env_from.secret_ref {
                    let sec_uid = g.add_node(pod_ns, &sec.name, "Secret");
                    g.add_edge(&pod_uid, &sec_uid, EdgeKind::Reads);
                }
            }
        }

        for volume in spec.volumes.as_deref().unwrap_or_default() {
            if let Some(cm) = &volume.config_map {
                let cm_uid = g.add_node(pod_ns, &cm.name, "ConfigMap");
                g.add_edge(&pod_uid, &cm_uid, EdgeKind::Mounts);
            } else if let Some(sec) = &volume.secret {
                if let Some(sec_name) = sec.secret_name.as_deref() {
                    let sec_uid = g.add_node(pod_ns, sec_name, "Secret");
                    g.add_edge(&pod_uid, &sec_uid, EdgeKind::Mounts);
                }
            }
        }
    }
}

/// Pod -> ServiceAccount identity, defaulting to "default" when unset
pub fn derive_identity(pods: &[Pod], g: &mut Graph) {
    for pod in pods {
        let pod_ns = namespace(&pod.metadata);
        let pod_uid = g.add_node(pod_ns, name(&pod.metadata), "Pod");

        let sa = pod
            .spec
            .as_ref()
            .and_then(|s| s.service_account_name.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("default");
        let sa_uid = g.add_node(pod_ns, sa, "ServiceAccount");
        g.add_edge(&pod_uid, &sa_uid, EdgeKind::Uses);
    }
}

// Stage wrappers: list what the derivation needs, derive, report.

pub async fn workload_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let deployments = accessor
        .deployments()
        .await
        .map_err(|e| StageError::list("workload", "Deployment", e))?;
    let replica_sets = accessor
        .replica_sets()
        .await
        .map_err(|e| StageError::list("workload", "ReplicaSet", e))?;
    let services = accessor
        .services()
        .await
        .map_err(|e| StageError::list("workload", "Service", e))?;
    let pods = accessor
        .pods()
        .await
        .map_err(|e| StageError::list("workload", "Pod", e))?;

    derive_ownership(&deployments, &replica_sets, &pods, g);
    derive_service_routes(&services, &pods, g);
    Ok(StageOutcome::new("workload", g.edge_count() - before))
}

pub async fn ingress_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let ingresses = accessor
        .ingresses()
        .await
        .map_err(|e| StageError::list("ingress", "Ingress", e))?;

    derive_ingress_routes(&ingresses, g);
    Ok(StageOutcome::new("ingress", g.edge_count() - before))
}

pub async fn endpoint_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let slices = accessor
        .endpoint_slices()
        .await
        .map_err(|e| StageError::list("endpoint", "EndpointSlice", e))?;
    let pods = accessor
        .pods()
        .await
        .map_err(|e| StageError::list("endpoint", "Pod", e))?;

    derive_endpoint_targets(&slices, &pods, g);
    Ok(StageOutcome::new("endpoint", g.edge_count() - before))
}

pub async fn controller_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let daemon_sets = accessor
        .daemon_sets()
        .await
        .map_err(|e| StageError::list("controller", "DaemonSet", e))?;
    let stateful_sets = accessor
        .stateful_sets()
        .await
        .map_err(|e| StageError::list("controller", "StatefulSet", e))?;
    let pods = accessor
        .pods()
        .await
        .map_err(|e| StageError::list("controller", "Pod", e))?;

    derive_controller_ownership(&daemon_sets, &stateful_sets, &pods, g);
    Ok(StageOutcome::new("controller", g.edge_count() - before))
}

pub async fn pvc_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let claims = accessor
        .persistent_volume_claims()
        .await
        .map_err(|e| StageError::list("pvc", "PersistentVolumeClaim", e))?;
    let volumes = accessor
        .persistent_volumes()
        .await
        .map_err(|e| StageError::list("pvc", "PersistentVolume", e))?;

    derive_bindings(&claims, &volumes, g);
    Ok(StageOutcome::new("pvc", g.edge_count() - before))
}

pub async fn netpol_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let policies = accessor
        .network_policies()
        .await
        .map_err(|e| StageError::list("netpol", "NetworkPolicy", e))?;
    let pods = accessor
        .pods()
        .await
        .map_err(|e| StageError::list("netpol", "Pod", e))?;

    derive_policy_allow(&policies, &pods, g);
    Ok(StageOutcome::new("netpol", g.edge_count() - before))
}

pub async fn job_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let jobs = accessor
        .jobs()
        .await
        .map_err(|e| StageError::list("job", "Job", e))?;
    let pods = accessor
        .pods()
        .await
        .map_err(|e| StageError::list("job", "Pod", e))?;

    derive_job_ownership(&jobs, &pods, g);
    Ok(StageOutcome::new("job", g.edge_count() - before))
}

pub async fn config_secret_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let pods = accessor
        .pods()
        .await
        .map_err(|e| StageError::list("config-secret", "Pod", e))?;

    derive_config_reads(&pods, g);
    Ok(StageOutcome::new("config-secret", g.edge_count() - before))
}

pub async fn service_account_stage(
    accessor: &dyn ResourceLister,
    g: &mut Graph,
) -> Result<StageOutcome, StageError> {
    let before = g.edge_count();
    let pods = accessor
        .pods()
        .await
        .map_err(|e| StageError::list("service-account", "Pod", e))?;

    derive_identity(&pods, g);
    Ok(StageOutcome::new("service-account", g.edge_count() - before))
}

/// One parent->child call dependency as reported by the Jaeger API
#[derive(Debug, Deserialize)]
pub struct JaegerDependency {
    pub parent: String,
    pub child: String,
}

/// Service -> Service call edges from Jaeger's dependency API.
///
/// A missing or unreachable Jaeger deployment is not an error; the stage
/// simply contributes nothing.
pub async fn jaeger_stage(api_url: &str, g: &mut Graph) -> StageOutcome {
    let before = g.edge_count();
    let url = format!(
        "{}/api/dependencies?lookback=3600",
        api_url.trim_end_matches('/')
    );
    match fetch_jaeger_dependencies(&url).await {
        Ok(deps) => {
            for dep in deps {
                let from = g.add_node("", &dep.parent, "Service");
                let to = g.add_node("", &dep.child, "Service");
                g.add_edge(&from, &to, EdgeKind::Calls);
            }
        }
        Err(e) => {
            tracing::warn!("jaeger dependency fetch failed: {}", e);
        }
    }
    StageOutcome::new("jaeger", g.edge_count() - before)
}

async fn fetch_jaeger_dependencies(url: &str) -> reqwest::Result<Vec<JaegerDependency>> {
    reqwest::get(url).await?.json().await
}
