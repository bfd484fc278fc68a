//! Resource relationship graph
//!
//! The directed multigraph of cluster objects. Nodes are keyed by a
//! sanitized `namespace_name` identifier; edges are keyed by
//! `(from, to, kind)` so repeated insertion is an idempotent upsert.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Relation kind carried on every edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Owns,
    Routes,
    Binds,
    Calls,
    Reads,
    Mounts,
    Uses,
    Allow,
    Targets,
}

impl EdgeKind {
    /// Lowercase wire/display name, matching the exported relation labels
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Owns => "owns",
            EdgeKind::Routes => "routes",
            EdgeKind::Binds => "binds",
            EdgeKind::Calls => "calls",
            EdgeKind::Reads => "reads",
            EdgeKind::Mounts => "mounts",
            EdgeKind::Uses => "uses",
            EdgeKind::Allow => "allow",
            EdgeKind::Targets => "targets",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A graph vertex representing one cluster object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Sanitized identifier (see [`safe_id`])
    pub uid: String,
    /// Original resource name
    pub label: String,
    /// Resource kind (Deployment, Pod, Service, ...)
    pub kind: String,
    /// Namespace; empty for cluster-scoped resources
    pub namespace: String,
}

/// A directed, kind-labeled relation between two nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Directed multigraph with a reverse incidence index.
///
/// `edge_index` maps every node UID to the set of edge ids touching it,
/// for both endpoints, so node removal can cascade in one pass.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: HashMap<String, Node>,
    pub edges: HashMap<String, Edge>,
    pub edge_index: HashMap<String, HashSet<String>>,
}

/// Shared handle to the live graph. The pipeline builds a private `Graph`
/// and swaps it in whole; event handlers mutate it under the lock.
pub type SharedGraph = Arc<Mutex<Graph>>;

/// Sanitize `namespace + "_" + name` into `[A-Za-z0-9_-]` identifier space
pub fn safe_id(namespace: &str, name: &str) -> String {
    format!("{}_{}", namespace, name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn edge_id(from: &str, to: &str, kind: EdgeKind) -> String {
    format!("{}->{}:{}", from, to, kind)
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if absent and return its UID.
    ///
    /// First write wins: within one pipeline run a later stage never
    /// overwrites the label/kind a previous stage recorded.
    pub fn add_node(&mut self, namespace: &str, name: &str, kind: &str) -> String {
        let uid = safe_id(namespace, name);
        self.nodes.entry(uid.clone()).or_insert_with(|| Node {
            uid: uid.clone(),
            label: name.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
        });
        uid
    }

    /// Add or overwrite a node, keeping label/kind at the latest observed
    /// value. This is the incremental-event path; batch stages use
    /// [`Graph::add_node`].
    pub fn upsert_node(&mut self, namespace: &str, name: &str, kind: &str) -> String {
        let uid = safe_id(namespace, name);
        self.nodes.insert(
            uid.clone(),
            Node {
                uid: uid.clone(),
                label: name.to_string(),
                kind: kind.to_string(),
                namespace: namespace.to_string(),
            },
        );
        uid
    }

    /// Insert an edge and index it under both endpoints.
    ///
    /// Calling twice with identical arguments has no observable effect.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let id = edge_id(from, to, kind);
        self.edges.insert(
            id.clone(),
            Edge {
                from: from.to_string(),
                to: to.to_string(),
                kind,
            },
        );
        for uid in [from, to] {
            self.edge_index
                .entry(uid.to_string())
                .or_default()
                .insert(id.clone());
        }
    }

    /// Remove a node and every edge incident to it.
    ///
    /// Each incident edge is deleted from `edges` and unindexed from the
    /// *other* endpoint's bucket as well as this node's own. Leaving the
    /// far side indexed would dangle an edge id pointing at nothing.
    pub fn remove_node(&mut self, uid: &str) {
        self.nodes.remove(uid);

        let Some(edge_ids) = self.edge_index.remove(uid) else {
            return;
        };
        for eid in edge_ids {
            if let Some(edge) = self.edges.remove(&eid) {
                let other = if edge.from == uid { &edge.to } else { &edge.from };
                if let Some(bucket) = self.edge_index.get_mut(other) {
                    bucket.remove(&eid);
                    if bucket.is_empty() {
                        self.edge_index.remove(other);
                    }
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True when an edge `from -> to` with `kind` exists
    pub fn has_edge(&self, from: &str, to: &str, kind: EdgeKind) -> bool {
        self.edges.contains_key(&edge_id(from, to, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_id_sanitization() {
        assert_eq!(safe_id("default", "web-abc"), "default_web-abc");
        assert_eq!(safe_id("kube.system", "a/b:c"), "kube_system_a_b_c");
        assert_eq!(safe_id("", "pv1"), "_pv1");
    }

    #[test]
    fn test_add_node_idempotent() {
        let mut g = Graph::new();
        let uid1 = g.add_node("ns1", "web", "Deployment");
        let uid2 = g.add_node("ns1", "web", "Deployment");
        assert_eq!(uid1, uid2);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_add_node_first_write_wins() {
        let mut g = Graph::new();
        let uid = g.add_node("ns1", "web", "Deployment");
        g.add_node("ns1", "web", "Pod");
        assert_eq!(g.nodes[&uid].kind, "Deployment");
    }

    #[test]
    fn test_upsert_node_overwrites() {
        let mut g = Graph::new();
        let uid = g.add_node("ns1", "web", "Deployment");
        g.upsert_node("ns1", "web", "Pod");
        assert_eq!(g.nodes[&uid].kind, "Pod");
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_add_edge_idempotent() {
        let mut g = Graph::new();
        let a = g.add_node("ns1", "a", "Deployment");
        let b = g.add_node("ns1", "b", "ReplicaSet");
        g.add_edge(&a, &b, EdgeKind::Owns);
        g.add_edge(&a, &b, EdgeKind::Owns);
        assert_eq!(g.edge_count(), 1);
        assert!(g.has_edge(&a, &b, EdgeKind::Owns));
    }

    #[test]
    fn test_add_edge_indexes_both_endpoints() {
        let mut g = Graph::new();
        let a = g.add_node("ns1", "a", "Service");
        let b = g.add_node("ns1", "b", "Pod");
        g.add_edge(&a, &b, EdgeKind::Routes);
        assert_eq!(g.edge_index[&a].len(), 1);
        assert_eq!(g.edge_index[&b].len(), 1);
    }

    #[test]
    fn test_parallel_edges_of_different_kinds() {
        let mut g = Graph::new();
        let a = g.add_node("ns1", "pod", "Pod");
        let b = g.add_node("ns1", "cm", "ConfigMap");
        g.add_edge(&a, &b, EdgeKind::Reads);
        g.add_edge(&a, &b, EdgeKind::Mounts);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_remove_node_cascades_both_sides() {
        let mut g = Graph::new();
        let dp = g.add_node("ns1", "web", "Deployment");
        let rs = g.add_node("ns1", "web-abc", "ReplicaSet");
        let pod = g.add_node("ns1", "web-abc-xyz", "Pod");
        g.add_edge(&dp, &rs, EdgeKind::Owns);
        g.add_edge(&rs, &pod, EdgeKind::Owns);

        g.remove_node(&rs);

        assert!(!g.nodes.contains_key(&rs));
        assert_eq!(g.edge_count(), 0);
        // The surviving endpoints must not keep stale edge ids around
        assert!(!g.edge_index.contains_key(&dp));
        assert!(!g.edge_index.contains_key(&pod));
        assert!(!g.edge_index.contains_key(&rs));
    }

    #[test]
    fn test_remove_node_keeps_unrelated_edges() {
        let mut g = Graph::new();
        let svc = g.add_node("ns1", "svc", "Service");
        let p1 = g.add_node("ns1", "p1", "Pod");
        let p2 = g.add_node("ns1", "p2", "Pod");
        g.add_edge(&svc, &p1, EdgeKind::Routes);
        g.add_edge(&svc, &p2, EdgeKind::Routes);

        g.remove_node(&p1);

        assert_eq!(g.edge_count(), 1);
        assert!(g.has_edge(&svc, &p2, EdgeKind::Routes));
        assert_eq!(g.edge_index[&svc].len(), 1);
    }

    #[test]
    fn test_remove_missing_node_is_noop() {
        let mut g = Graph::new();
        g.add_node("ns1", "a", "Pod");
        g.remove_node("ns1_missing");
        assert_eq!(g.node_count(), 1);
    }
}
