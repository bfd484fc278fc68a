//! Flat file renderings: Mermaid diagram text and CSV node/edge tables

use super::{ExportError, GraphSink};
use crate::graph::Graph;
use async_trait::async_trait;
use std::path::PathBuf;

/// Render the graph as Mermaid flowchart text, one line per edge.
///
/// Node ids are already sanitized to `[A-Za-z0-9_-]` by the graph store,
/// so they can be emitted verbatim. Lines are sorted for stable output.
pub fn render_mermaid(graph: &Graph) -> String {
    let mut lines: Vec<String> = graph
        .edges
        .values()
        .map(|e| {
            let from_label = graph.nodes.get(&e.from).map(|n| n.label.as_str()).unwrap_or("");
            let to_label = graph.nodes.get(&e.to).map(|n| n.label.as_str()).unwrap_or("");
            format!(
                "{}[\"{}\"] -->|{}| {}[\"{}\"]",
                e.from, from_label, e.kind, e.to, to_label
            )
        })
        .collect();
    lines.sort();

    let mut out = String::from("graph LR\n");
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Render the node table: UID, Label, Type, NS
pub fn render_nodes_csv(graph: &Graph) -> String {
    let mut rows: Vec<String> = graph
        .nodes
        .values()
        .map(|n| format!("{},{},{},{}", n.uid, n.label, n.kind, n.namespace))
        .collect();
    rows.sort();

    let mut out = String::from("UID,Label,Type,NS\n");
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// Render the edge table: FromUID, ToUID, Kind
pub fn render_edges_csv(graph: &Graph) -> String {
    let mut rows: Vec<String> = graph
        .edges
        .values()
        .map(|e| format!("{},{},{}", e.from, e.to, e.kind))
        .collect();
    rows.sort();

    let mut out = String::from("FromUID,ToUID,Kind\n");
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// Writes the Mermaid diagram and both CSV tables into one directory.
///
/// Every export rewrites the files whole, so repeated exports of the same
/// graph are byte-identical.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl GraphSink for FileSink {
    async fn export(&self, graph: &Graph) -> Result<(), ExportError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join("staticgraph.mmd"), render_mermaid(graph))?;
        std::fs::write(self.dir.join("nodes.csv"), render_nodes_csv(graph))?;
        std::fs::write(self.dir.join("edges.csv"), render_edges_csv(graph))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    fn sample_graph() -> Graph {
        let mut g = Graph::new();
        let dp = g.add_node("ns1", "web", "Deployment");
        let rs = g.add_node("ns1", "web-abc", "ReplicaSet");
        g.add_edge(&dp, &rs, EdgeKind::Owns);
        g
    }

    #[test]
    fn test_render_mermaid() {
        let out = render_mermaid(&sample_graph());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "graph LR");
        assert_eq!(
            lines[1],
            "ns1_web[\"web\"] -->|owns| ns1_web-abc[\"web-abc\"]"
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_render_mermaid_tolerates_dangling_endpoint() {
        let mut g = sample_graph();
        g.nodes.remove("ns1_web-abc");
        let out = render_mermaid(&g);
        assert!(out.contains("ns1_web-abc[\"\"]"));
    }

    #[test]
    fn test_render_csv_tables() {
        let g = sample_graph();
        let nodes = render_nodes_csv(&g);
        assert_eq!(nodes.lines().next().unwrap(), "UID,Label,Type,NS");
        assert!(nodes.contains("ns1_web,web,Deployment,ns1"));
        assert!(nodes.contains("ns1_web-abc,web-abc,ReplicaSet,ns1"));

        let edges = render_edges_csv(&g);
        assert_eq!(edges.lines().next().unwrap(), "FromUID,ToUID,Kind");
        assert!(edges.contains("ns1_web,ns1_web-abc,owns"));
    }

    #[tokio::test]
    async fn test_file_sink_rewrites_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().to_path_buf());
        let g = sample_graph();

        sink.export(&g).await.unwrap();
        let first = std::fs::read_to_string(dir.path().join("staticgraph.mmd")).unwrap();
        sink.export(&g).await.unwrap();
        let second = std::fs::read_to_string(dir.path().join("staticgraph.mmd")).unwrap();

        assert_eq!(first, second);
        assert!(dir.path().join("nodes.csv").exists());
        assert!(dir.path().join("edges.csv").exists());
    }
}
