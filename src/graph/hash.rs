// src/graph/hash.rs

//! Graph hash: SHA-256 hex over the canonical JSON of the normalized graph
//! body (tasks + edges only). Metadata and `schema_version` never enter the
//! hash — the contract is structural, not presentational.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::graph::model::Graph;
use crate::types::HashHex;

#[derive(Serialize)]
struct CanonicalTask<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    task_type: &'a Option<String>,
    command: &'a str,
    inputs: Vec<&'a str>,
    env: &'a std::collections::BTreeMap<String, String>,
    outputs: Vec<&'a str>,
    upstream: &'a [String],
}

#[derive(Serialize)]
struct CanonicalEdge<'a> {
    from: &'a str,
    to: &'a str,
}

#[derive(Serialize)]
struct CanonicalGraphBody<'a> {
    tasks: Vec<CanonicalTask<'a>>,
    edges: Vec<CanonicalEdge<'a>>,
}

/// Builds the canonical JSON body used both for the graph hash and for
/// invariant-1-style round-trip comparisons. `BTreeMap`/sorted-`Vec` fields
/// on [`Graph`] already guarantee ordering; this just borrows them into a
/// flat, serialization-stable shape.
fn canonical_body(graph: &Graph) -> CanonicalGraphBody<'_> {
    let tasks = graph
        .tasks()
        .map(|t| CanonicalTask {
            name: &t.name,
            task_type: &t.task_type,
            command: &t.command,
            inputs: t.inputs.iter().map(|s| s.as_str()).collect(),
            env: &t.env,
            outputs: t.outputs.iter().map(|s| s.as_str()).collect(),
            upstream: &t.upstream,
        })
        .collect();
    let edges = graph
        .edges()
        .iter()
        .map(|e| CanonicalEdge {
            from: &e.from,
            to: &e.to,
        })
        .collect();
    CanonicalGraphBody { tasks, edges }
}

/// Serializes the normalized graph body as compact, canonical JSON bytes.
pub fn canonical_bytes(graph: &Graph) -> Vec<u8> {
    serde_json::to_vec(&canonical_body(graph)).expect("canonical graph body is always valid JSON")
}

pub fn graph_hash(graph: &Graph) -> HashHex {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(graph));
    crate::hashutil::to_hex(&hasher.finalize())
}
