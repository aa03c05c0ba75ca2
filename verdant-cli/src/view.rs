//! Plain-text rendering of a project for the terminal.

use std::fmt::Write;

use verdant_collab::SessionStatus;
use verdant_core::{Component, GraphState};

pub fn status_line(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Idle => "[idle]".to_string(),
        SessionStatus::Loading => "[loading project…]".to_string(),
        SessionStatus::Live => "[live]".to_string(),
        SessionStatus::Stale { attempts } => {
            format!("[stale] live updates stopped after {attempts} failed reconnects")
        }
        SessionStatus::Failed(reason) => format!("[error] {reason}"),
    }
}

pub fn summary(graph: &GraphState) -> String {
    format!(
        "{} nodes, {} relations, {} materials · score {:.3}",
        graph.nodes.len(),
        graph.edges.len(),
        graph.materials.len(),
        graph.sustainability_score()
    )
}

/// Full listing, nodes grouped by level.
pub fn render(graph: &GraphState) -> String {
    let mut out = String::new();
    let mut nodes: Vec<&Component> = graph.nodes.iter().collect();
    nodes.sort_by_key(|n| (n.depth(), n.id));

    let _ = writeln!(out, "nodes:");
    for node in nodes {
        let _ = writeln!(out, "  {}", node_line(node));
    }
    let _ = writeln!(out, "relations:");
    for edge in &graph.edges {
        let _ = writeln!(out, "  #{} {} -> {}", edge.id, edge.source, edge.target);
    }
    let _ = writeln!(out, "materials:");
    for m in &graph.materials {
        let _ = writeln!(
            out,
            "  #{} {} weight={} co2={} hardness={}",
            m.id,
            m.name.as_deref().unwrap_or("?"),
            opt(m.weight),
            opt(m.co2_value),
            opt(m.hardness)
        );
    }
    let _ = write!(out, "{}", summary(graph));
    out
}

pub fn node_line(node: &Component) -> String {
    let mut line = format!(
        "{}#{} {} (level {})",
        "  ".repeat(node.depth() as usize),
        node.id,
        node.name.as_deref().unwrap_or("?"),
        node.depth()
    );
    if let Some(parent) = node.parent_id {
        let _ = write!(line, " parent={parent}");
    }
    if let Some(material) = node.material_id {
        let _ = write!(line, " material={material}");
    }
    if let Some(weight) = node.weight {
        let _ = write!(line, " atomic weight={weight}");
    }
    if let Some(conn) = &node.connection_type {
        let _ = write!(line, " {conn}");
    }
    if let Some(p) = node.position {
        let _ = write!(line, " @({}, {})", p.x, p.y);
    }
    line
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}
