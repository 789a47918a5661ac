// src/graph/parse.rs

//! Wire-format deserialization for the graph document.
//!
//! The document shape from the external interface is `{schema_version,
//! graph:{nodes, edges}, metadata}`. §6 sketches a node as `{id, type,
//! inputs, outputs}`, but the data model (§3) requires every `Task` to carry
//! a command string and a map of environment variables that the sketch
//! doesn't name explicitly. This crate resolves that gap (documented in
//! DESIGN.md) by accepting `command` (required) and `env` (optional object,
//! default empty) as additional node fields, and by treating `inputs` as an
//! object whose *values* are declared input paths — the keys are caller-
//! chosen labels with no semantic weight beyond readability.
//!
//! Every object in the strict part of the schema rejects unknown fields;
//! `metadata` is deliberately untyped (`serde_json::Value`) since it is
//! excluded from the graph hash and carries no schema obligations.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::error::Category;

use crate::errors::{EngineError, Result};

pub const SUPPORTED_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDocument {
    pub schema_version: String,
    pub graph: RawGraphBody,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGraphBody {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    pub command: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEdge {
    pub from: String,
    pub to: String,
}

/// Parses raw bytes into the wire-level document, classifying the failure
/// per the closed error taxonomy: malformed JSON or strict-schema unknown
/// fields surface as `Parse`; a well-formed-but-ill-typed document (missing
/// required field, wrong type) surfaces as `Schema`.
pub fn parse_document(bytes: &[u8]) -> Result<RawDocument> {
    serde_json::from_slice(bytes).map_err(classify_deserialize_error)
}

fn classify_deserialize_error(err: serde_json::Error) -> EngineError {
    match err.classify() {
        Category::Io => EngineError::Workspace(err.to_string()),
        Category::Syntax | Category::Eof => EngineError::Parse(err.to_string()),
        Category::Data => {
            if err.to_string().contains("unknown field") {
                EngineError::Parse(err.to_string())
            } else {
                EngineError::Schema(err.to_string())
            }
        }
    }
}

/// Checks the declared schema version, the one semantic check that belongs
/// to parsing rather than structural validation.
pub fn check_schema_version(doc: &RawDocument) -> Result<()> {
    if doc.schema_version != SUPPORTED_SCHEMA_VERSION {
        return Err(EngineError::Semantic(format!(
            "unsupported schema_version '{}', expected '{}'",
            doc.schema_version, SUPPORTED_SCHEMA_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn valid_doc() -> &'static str {
        r#"{"schema_version":"1.0.0","graph":{"nodes":[{"id":"a","command":"true","inputs":{},"env":{},"outputs":[]}],"edges":[]},"metadata":{}}"#
    }

    #[test]
    fn parses_well_formed_document() {
        let doc = parse_document(valid_doc().as_bytes()).unwrap();
        assert_eq!(doc.schema_version, "1.0.0");
        assert_eq!(doc.graph.nodes.len(), 1);
        check_schema_version(&doc).unwrap();
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_document(b"{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn unknown_field_is_parse_error() {
        let bytes = br#"{"schema_version":"1.0.0","graph":{"nodes":[],"edges":[]},"metadata":{},"bogus":1}"#;
        let err = parse_document(bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn missing_required_field_is_schema_error() {
        // Node is missing the required `command` field.
        let bytes = br#"{"schema_version":"1.0.0","graph":{"nodes":[{"id":"a","inputs":{},"env":{},"outputs":[]}],"edges":[]},"metadata":{}}"#;
        let err = parse_document(bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn wrong_schema_version_is_semantic_error() {
        let bytes = br#"{"schema_version":"9.9.9","graph":{"nodes":[],"edges":[]},"metadata":{}}"#;
        let doc = parse_document(bytes).unwrap();
        let err = check_schema_version(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Semantic);
    }

    #[test]
    fn inputs_map_keys_are_labels_values_are_paths() {
        let bytes = br#"{"schema_version":"1.0.0","graph":{"nodes":[{"id":"a","command":"true","inputs":{"label":"some/path.txt"},"env":{},"outputs":[]}],"edges":[]},"metadata":{}}"#;
        let doc = parse_document(bytes).unwrap();
        assert_eq!(doc.graph.nodes[0].inputs.get("label"), Some(&"some/path.txt".to_string()));
    }
}
