// src/graph/normalize.rs

//! Converts a validated raw document into the canonical [`Graph`].
//!
//! Validation has already run by the time this is called, so node ids are
//! unique and every edge endpoint resolves — this stage is infallible.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::model::{Edge, Graph, Task};
use crate::graph::parse::RawGraphBody;

pub fn normalize(body: RawGraphBody) -> Graph {
    let mut edges: Vec<Edge> = body
        .edges
        .into_iter()
        .map(|e| Edge {
            from: e.from,
            to: e.to,
        })
        .collect();
    edges.sort();
    edges.dedup();

    let mut upstream_of: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for edge in &edges {
        upstream_of
            .entry(edge.to.clone())
            .or_default()
            .push(edge.from.clone());
    }

    let mut tasks: BTreeMap<String, Task> = BTreeMap::new();
    for node in body.nodes {
        let outputs: BTreeSet<String> = node.outputs.into_iter().collect();
        let inputs: BTreeSet<String> = node.inputs.into_values().collect();
        let mut upstream = upstream_of.remove(&node.id).unwrap_or_default();
        upstream.sort();
        upstream.dedup();

        tasks.insert(
            node.id.clone(),
            Task {
                name: node.id,
                task_type: node.node_type,
                command: node.command,
                inputs,
                env: node.env,
                outputs,
                upstream,
            },
        );
    }

    Graph { tasks, edges }
}
