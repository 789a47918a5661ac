#![allow(dead_code)]

//! Builders for constructing graph documents in tests without hand-writing
//! JSON, mirroring the teacher's `ConfigFileBuilder`/`TaskConfigBuilder`
//! pair generalized from TOML task configs to the node/edge wire format.

use std::collections::BTreeMap;

use taskgraph::graph::Graph;

/// Staged task node, assembled into the wire document by [`GraphBuilder`].
pub struct TaskSpec {
    id: String,
    node_type: Option<String>,
    command: String,
    inputs: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
    outputs: Vec<String>,
    after: Vec<String>,
}

impl TaskSpec {
    pub fn new(id: &str, command: &str) -> Self {
        Self {
            id: id.to_string(),
            node_type: None,
            command: command.to_string(),
            inputs: BTreeMap::new(),
            env: BTreeMap::new(),
            outputs: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn task_type(mut self, t: &str) -> Self {
        self.node_type = Some(t.to_string());
        self
    }

    pub fn input(mut self, path: &str) -> Self {
        self.inputs.insert(path.to_string(), path.to_string());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.outputs.push(path.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Declares `dep` as a direct upstream of this task; `GraphBuilder`
    /// turns this into a `{from: dep, to: self.id}` edge.
    pub fn after(mut self, dep: &str) -> Self {
        self.after.push(dep.to_string());
        self
    }
}

/// Assembles staged [`TaskSpec`]s into a graph document and either its raw
/// JSON bytes or a loaded, validated [`Graph`].
#[derive(Default)]
pub struct GraphBuilder {
    tasks: Vec<TaskSpec>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    pub fn metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn to_document_bytes(&self) -> Vec<u8> {
        let nodes: Vec<serde_json::Value> = self
            .tasks
            .iter()
            .map(|t| {
                let mut node = serde_json::json!({
                    "id": t.id,
                    "command": t.command,
                    "inputs": t.inputs,
                    "env": t.env,
                    "outputs": t.outputs,
                });
                if let Some(ty) = &t.node_type {
                    node["type"] = serde_json::Value::String(ty.clone());
                }
                node
            })
            .collect();

        let mut edges: Vec<serde_json::Value> = Vec::new();
        for t in &self.tasks {
            for dep in &t.after {
                edges.push(serde_json::json!({"from": dep, "to": t.id}));
            }
        }

        let doc = serde_json::json!({
            "schema_version": "1.0.0",
            "graph": {
                "nodes": nodes,
                "edges": edges,
            },
            "metadata": serde_json::Value::Object(self.metadata.clone()),
        });
        serde_json::to_vec(&doc).expect("test document is always serializable")
    }

    /// Loads the assembled document through the real `graph::load` entry
    /// point (parse + validate + normalize), panicking on failure since a
    /// builder-constructed test graph is expected to be well-formed.
    pub fn build(&self) -> Graph {
        taskgraph::graph::load(&self.to_document_bytes())
            .expect("test graph built by GraphBuilder should be valid")
    }
}
