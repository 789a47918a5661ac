// src/graph/validate.rs

//! Structural validation over the raw (pre-normalization) document.
//!
//! Duplicate-id detection needs the raw node list rather than the
//! normalized `Graph`, since the normalized form is keyed by a `BTreeMap`
//! that would silently collapse duplicates. Validation therefore runs
//! between parsing and normalization.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{EngineError, Result};
use crate::graph::parse::{RawEdge, RawGraphBody};

/// Runs every structural check in the fixed order (duplicate id, then
/// self-reference, then dangling edge, then cycle) and returns the first
/// violation found, with a deterministic witness.
pub fn validate(body: &RawGraphBody) -> Result<()> {
    check_duplicate_ids(&body.nodes)?;
    let ids: BTreeSet<&str> = body.nodes.iter().map(|n| n.id.as_str()).collect();
    check_self_references(&body.edges)?;
    check_dangling_edges(&body.edges, &ids)?;
    check_cycles(&ids, &body.edges)?;
    Ok(())
}

fn check_duplicate_ids(nodes: &[crate::graph::parse::RawNode]) -> Result<()> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut duplicated: BTreeSet<&str> = BTreeSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            duplicated.insert(node.id.as_str());
        }
    }
    if let Some(first) = duplicated.iter().next() {
        return Err(EngineError::structural(
            "duplicate_id",
            format!("duplicate task id '{first}'"),
        ));
    }
    Ok(())
}

fn check_self_references(edges: &[RawEdge]) -> Result<()> {
    let mut offenders: BTreeSet<&str> = BTreeSet::new();
    for edge in edges {
        if edge.from == edge.to {
            offenders.insert(edge.from.as_str());
        }
    }
    if let Some(first) = offenders.iter().next() {
        return Err(EngineError::structural(
            "self_reference",
            format!("task '{first}' has a self-referencing edge"),
        ));
    }
    Ok(())
}

fn check_dangling_edges(edges: &[RawEdge], ids: &BTreeSet<&str>) -> Result<()> {
    let mut offenders: BTreeSet<&str> = BTreeSet::new();
    for edge in edges {
        if !ids.contains(edge.from.as_str()) {
            offenders.insert(edge.from.as_str());
        }
        if !ids.contains(edge.to.as_str()) {
            offenders.insert(edge.to.as_str());
        }
    }
    if let Some(first) = offenders.iter().next() {
        return Err(EngineError::structural(
            "dangling_edge",
            format!("edge references unknown task '{first}'"),
        ));
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Coloring DFS over nodes in sorted order, visiting neighbors in sorted
/// order, so the first cycle found — and its witness path — is independent
/// of source ordering.
fn check_cycles(ids: &BTreeSet<&str>, edges: &[RawEdge]) -> Result<()> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for id in ids {
        adjacency.entry(id).or_default();
    }
    for edge in edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort_unstable();
    }

    let mut color: BTreeMap<&str, Color> = ids.iter().map(|id| (*id, Color::White)).collect();
    let mut stack: Vec<&str> = Vec::new();

    for &start in ids {
        if color[start] == Color::White {
            if let Some(witness) = dfs(start, &adjacency, &mut color, &mut stack) {
                return Err(EngineError::structural(
                    "cycle",
                    format!("cycle detected: {}", witness.join(" -> ")),
                ));
            }
        }
    }
    Ok(())
}

fn dfs<'a>(
    node: &'a str,
    adjacency: &BTreeMap<&'a str, Vec<&'a str>>,
    color: &mut BTreeMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    color.insert(node, Color::Gray);
    stack.push(node);

    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            match color.get(next).copied().unwrap_or(Color::White) {
                Color::White => {
                    if let Some(witness) = dfs(next, adjacency, color, stack) {
                        return Some(witness);
                    }
                }
                Color::Gray => {
                    // `next` is re-entered while still gray: the cycle witness
                    // is the suffix of the stack from its first occurrence.
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut witness: Vec<String> =
                        stack[start..].iter().map(|s| s.to_string()).collect();
                    witness.push(next.to_string());
                    return Some(witness);
                }
                Color::Black => {}
            }
        }
    }

    stack.pop();
    color.insert(node, Color::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::parse::RawNode;
    use std::collections::BTreeMap;

    fn node(id: &str) -> RawNode {
        RawNode {
            id: id.to_string(),
            node_type: None,
            command: "true".to_string(),
            inputs: BTreeMap::new(),
            env: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    fn edge(from: &str, to: &str) -> RawEdge {
        RawEdge { from: from.to_string(), to: to.to_string() }
    }

    #[test]
    fn valid_linear_graph_passes() {
        let body = RawGraphBody {
            nodes: vec![node("a"), node("b"), node("c")],
            edges: vec![edge("a", "b"), edge("b", "c")],
        };
        validate(&body).unwrap();
    }

    #[test]
    fn duplicate_ids_report_lexicographically_first() {
        let body = RawGraphBody {
            nodes: vec![node("b"), node("a"), node("a")],
            edges: vec![],
        };
        let err = validate(&body).unwrap_err();
        assert!(err.to_string().contains("duplicate_id"));
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn self_reference_is_rejected() {
        let body = RawGraphBody {
            nodes: vec![node("a")],
            edges: vec![edge("a", "a")],
        };
        let err = validate(&body).unwrap_err();
        assert!(err.to_string().contains("self_reference"));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let body = RawGraphBody {
            nodes: vec![node("a")],
            edges: vec![edge("a", "ghost")],
        };
        let err = validate(&body).unwrap_err();
        assert!(err.to_string().contains("dangling_edge"));
    }

    #[test]
    fn cycle_is_rejected_with_witness_path() {
        let body = RawGraphBody {
            nodes: vec![node("a"), node("b"), node("c")],
            edges: vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        };
        let err = validate(&body).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle"));
        assert!(msg.contains("a -> b -> c -> a"));
    }

    #[test]
    fn cycle_witness_starts_from_first_reentered_gray_node_in_sorted_order() {
        // a has two branches; only b->c->b is cyclic. The witness must be
        // confined to the actual gray re-entry, not the whole visited stack.
        let body = RawGraphBody {
            nodes: vec![node("a"), node("b"), node("c"), node("d")],
            edges: vec![edge("a", "b"), edge("b", "c"), edge("c", "b"), edge("a", "d")],
        };
        let err = validate(&body).unwrap_err();
        assert!(err.to_string().contains("b -> c -> b"));
    }

    #[test]
    fn checks_run_in_fixed_order_duplicate_id_before_cycle() {
        // This graph has both a duplicate id and a cycle; duplicate must win.
        let body = RawGraphBody {
            nodes: vec![node("a"), node("a")],
            edges: vec![edge("a", "a")],
        };
        let err = validate(&body).unwrap_err();
        assert!(err.to_string().contains("duplicate_id"));
    }
}
