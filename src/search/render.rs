//! Standalone HTML rendering of a co-occurrence graph with vis-network.

use serde::Serialize;

use super::graph::{CooccurrenceGraph, NodeKind};
use super::layout::force_layout;
use crate::core::config::GraphConfig;
use crate::core::model::Post;

const KEYWORD_COLOR: &str = "lightgreen";
const TITLE_COLOR: &str = "skyblue";
const KEYWORD_SIZE: u32 = 80;
const KEYWORD_FONT: u32 = 100;
const TITLE_SIZE: u32 = 60;
const TITLE_FONT: u32 = 40;
const EDGE_WIDTH: u32 = 12;
const CANVAS_HEIGHT: &str = "800px";
const CANVAS_WIDTH: &str = "1500px";

#[derive(Serialize)]
struct VisNode<'a> {
    id: usize,
    label: &'a str,
    title: &'a str,
    group: NodeKind,
    color: &'static str,
    size: u32,
    font: VisFont,
    x: f64,
    y: f64,
}

#[derive(Serialize)]
struct VisFont {
    size: u32,
}

#[derive(Serialize)]
struct VisEdge {
    from: usize,
    to: usize,
    width: u32,
}

/// Lay out the graph induced by `neighbors` and render it.
pub fn render_graph(neighbors: &[&Post], config: &GraphConfig, seed: u64) -> String {
    let graph = CooccurrenceGraph::from_posts(neighbors.iter().copied(), config.wrap_width);
    let positions = force_layout(&graph, config.layout_iterations, seed);
    render_html(&graph, &positions)
}

/// HTML page drawing `graph` at `positions` (one per node, in node order).
pub fn render_html(graph: &CooccurrenceGraph, positions: &[[f64; 2]]) -> String {
    let nodes: Vec<VisNode> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(id, node)| {
            let [x, y] = positions.get(id).copied().unwrap_or([0.0, 0.0]);
            let (color, size, font) = match node.kind {
                NodeKind::Keyword => (KEYWORD_COLOR, KEYWORD_SIZE, KEYWORD_FONT),
                NodeKind::Title => (TITLE_COLOR, TITLE_SIZE, TITLE_FONT),
            };
            VisNode {
                id,
                label: &node.label,
                title: &node.name,
                group: node.kind,
                color,
                size,
                font: VisFont { size: font },
                x,
                y,
            }
        })
        .collect();

    let edges: Vec<VisEdge> = graph
        .edges
        .iter()
        .map(|&(from, to)| VisEdge {
            from,
            to,
            width: EDGE_WIDTH,
        })
        .collect();

    let nodes_json = script_safe(serde_json::to_string(&nodes).unwrap_or_else(|_| "[]".into()));
    let edges_json = script_safe(serde_json::to_string(&edges).unwrap_or_else(|_| "[]".into()));

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Keyword graph</title>
<script src="https://unpkg.com/vis-network/standalone/umd/vis-network.min.js"></script>
<style>
  #graph {{ width: {width}; height: {height}; border: 1px solid lightgray; }}
</style>
</head>
<body>
<div id="graph"></div>
<script>
  var nodes = new vis.DataSet({nodes});
  var edges = new vis.DataSet({edges});
  var options = {{
    physics: {{
      solver: "barnesHut",
      barnesHut: {{
        gravitationalConstant: -80000,
        centralGravity: 0.3,
        springLength: 250,
        springConstant: 0.001,
        damping: 0.09,
        avoidOverlap: 0
      }}
    }},
    nodes: {{ shape: "dot" }},
    edges: {{ smooth: false }}
  }};
  new vis.Network(document.getElementById("graph"), {{ nodes: nodes, edges: edges }}, options);
</script>
</body>
</html>
"#,
        width = CANVAS_WIDTH,
        height = CANVAS_HEIGHT,
        nodes = nodes_json,
        edges = edges_json,
    )
}

// A title containing "</script>" must not end the inline script early
fn script_safe(json: String) -> String {
    json.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{DatasetMetadata, PostId};

    fn post(id: u64, title: &str, keywords: &[&str]) -> Post {
        Post {
            id: PostId(id),
            title: title.to_string(),
            description: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            metadata: DatasetMetadata::default(),
            filename: None,
            author: "Ada".to_string(),
            date: None,
            likes: 0,
        }
    }

    #[test]
    fn test_render_styles_nodes_by_kind() {
        let a = post(1, "Mouse liver atlas", &["rna-seq", "liver"]);
        let b = post(2, "Human liver", &["rna-seq", "liver"]);
        let html = render_graph(&[&a, &b], &GraphConfig::default(), 3);

        assert!(html.contains("vis.Network"));
        assert!(html.contains("barnesHut"));
        assert!(html.contains(r#""label":"rna-seq""#));
        assert!(html.contains(r#""color":"lightgreen","size":80,"font":{"size":100}"#));
        assert!(html.contains(r#""color":"skyblue","size":60,"font":{"size":40}"#));
        assert!(html.contains(r#""width":12"#));
    }

    #[test]
    fn test_render_escapes_script_close() {
        let a = post(1, "</script><b>", &["k"]);
        let b = post(2, "other", &["k"]);
        let html = render_graph(&[&a, &b], &GraphConfig::default(), 1);
        assert!(!html.contains("</script><b>"));
        assert!(html.contains(r"<\/script><b>"));
    }

    #[test]
    fn test_empty_graph_still_renders() {
        let html = render_html(&CooccurrenceGraph::default(), &[]);
        assert!(html.contains("new vis.DataSet([])"));
    }
}
