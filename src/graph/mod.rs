// src/graph/mod.rs

//! Graph contract: parse → normalize → validate → hash.
//!
//! Validation intentionally runs on the raw, pre-normalization document
//! (duplicate ids are only detectable before they collapse into a map), so
//! the public [`load`] entry point sequences parse, validate, normalize,
//! then exposes the graph hash as a pure function of the result.

pub mod hash;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod validate;

pub use model::{Edge, Graph, Task};

use crate::errors::Result;

/// Parses, validates, and normalizes a graph document in one call. This is
/// the only supported way to obtain a [`Graph`] from untrusted bytes.
pub fn load(bytes: &[u8]) -> Result<Graph> {
    let doc = parse::parse_document(bytes)?;
    parse::check_schema_version(&doc)?;
    validate::validate(&doc.graph)?;
    Ok(normalize::normalize(doc.graph))
}

pub fn graph_hash(graph: &Graph) -> crate::types::HashHex {
    hash::graph_hash(graph)
}
