//! Incremental graph updates from watch notifications

use crate::graph::{Graph, safe_id};
use thiserror::Error;

/// The notification kinds delivered by the watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Updated,
    Deleted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Added => f.write_str("added"),
            EventKind::Updated => f.write_str("updated"),
            EventKind::Deleted => f.write_str("deleted"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{event} event for {kind} carried no object name")]
    MissingName { kind: String, event: EventKind },
}

/// Reduce one notification onto the graph.
///
/// Added and Updated both resolve to an identity upsert; Deleted removes
/// the node with full edge cascade. Deliveries are unordered across object
/// kinds, so each apply stands alone and re-application is harmless.
pub fn apply(
    g: &mut Graph,
    kind: &str,
    event: EventKind,
    namespace: &str,
    name: &str,
) -> Result<(), ApplyError> {
    if name.is_empty() {
        return Err(ApplyError::MissingName {
            kind: kind.to_string(),
            event,
        });
    }

    tracing::debug!(kind, %event, namespace, name, "applying watch event");
    match event {
        EventKind::Added | EventKind::Updated => {
            g.upsert_node(namespace, name, kind);
        }
        EventKind::Deleted => {
            g.remove_node(&safe_id(namespace, name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    #[test]
    fn test_add_then_update_overwrites_identity() {
        let mut g = Graph::new();
        apply(&mut g, "Pod", EventKind::Added, "ns1", "web-1").unwrap();
        apply(&mut g, "ReplicaSet", EventKind::Updated, "ns1", "web-1").unwrap();

        let node = &g.nodes[&safe_id("ns1", "web-1")];
        assert_eq!(node.kind, "ReplicaSet");
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut g = Graph::new();
        apply(&mut g, "Pod", EventKind::Added, "ns1", "web-1").unwrap();
        apply(&mut g, "Pod", EventKind::Added, "ns1", "web-1").unwrap();
        assert_eq!(g.node_count(), 1);

        apply(&mut g, "Pod", EventKind::Deleted, "ns1", "web-1").unwrap();
        apply(&mut g, "Pod", EventKind::Deleted, "ns1", "web-1").unwrap();
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn test_delete_cascades_edges() {
        let mut g = Graph::new();
        let svc = g.add_node("ns1", "svc", "Service");
        let pod = g.add_node("ns1", "pod-1", "Pod");
        g.add_edge(&svc, &pod, EdgeKind::Routes);

        apply(&mut g, "Pod", EventKind::Deleted, "ns1", "pod-1").unwrap();

        assert_eq!(g.edge_count(), 0);
        assert!(!g.edge_index.contains_key(&svc));
        assert!(g.nodes.contains_key(&svc));
    }

    #[test]
    fn test_update_does_not_touch_edges() {
        let mut g = Graph::new();
        let svc = g.add_node("ns1", "svc", "Service");
        let pod = g.add_node("ns1", "pod-1", "Pod");
        g.add_edge(&svc, &pod, EdgeKind::Routes);

        apply(&mut g, "Pod", EventKind::Updated, "ns1", "pod-1").unwrap();

        assert_eq!(g.edge_count(), 1);
        assert!(g.has_edge(&svc, &pod, EdgeKind::Routes));
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let mut g = Graph::new();
        let err = apply(&mut g, "Pod", EventKind::Added, "ns1", "").unwrap_err();
        assert!(matches!(err, ApplyError::MissingName { .. }));
        assert_eq!(g.node_count(), 0);
    }
}
