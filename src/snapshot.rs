// src/snapshot.rs

//! Graph/node snapshots (§3): the immutable per-node identity projection the
//! invalidation analyzer compares between two runs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::graph::model::{Graph, Task};
use crate::hash::task_hash::TaskHasher;
use crate::types::{HashHex, TaskName};

/// Per-node identity snapshot used by the invalidation analyzer. Persisted
/// to disk between incremental runs (§4.4 needs the *previous* snapshot),
/// hence the `Serialize`/`Deserialize` derive on top of the in-memory use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: TaskName,
    pub task_hash: HashHex,
    pub inputs: BTreeSet<String>,
    pub input_hash: HashHex,
    pub env: BTreeMap<String, String>,
    pub command: String,
    pub outputs: BTreeSet<String>,
    pub upstream: BTreeSet<TaskName>,
}

/// Map of task name to its identity snapshot.
pub type GraphSnapshot = BTreeMap<TaskName, NodeSnapshot>;

#[derive(Serialize)]
struct CanonicalInputDigests<'a>(Vec<(&'a str, String)>);

/// Computes the content hash over a task's resolved input digests alone
/// (no command/env/outputs/workdir) — the narrower signal `InputChanged`
/// keys off of, distinct from the full task hash used for cache lookups.
fn input_hash(fs: &dyn FileSystem, task: &Task, work_dir: &Path) -> Result<HashHex> {
    use std::io::Read;

    let mut digests: Vec<(&str, String)> = Vec::with_capacity(task.inputs.len());
    for input in &task.inputs {
        let path = work_dir.join(input);
        let mut reader = fs
            .open_read(&path)
            .map_err(|e| crate::errors::EngineError::Workspace(format!("{e:#}")))?;
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| crate::errors::EngineError::Workspace(e.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        digests.push((input.as_str(), hasher.finalize().to_hex().to_string()));
    }

    let bytes = serde_json::to_vec(&CanonicalInputDigests(digests))
        .expect("canonical input digest list is always valid JSON");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(crate::hashutil::to_hex(hasher.finalize()))
}

/// Builds a [`NodeSnapshot`] for a single task, resolving its inputs against
/// `fs`/`work_dir`. Returns `Ok(None)` semantics are not needed: a missing
/// declared input is always a hard Workspace error (consistent with the
/// task hasher).
pub fn snapshot_task(fs: &dyn FileSystem, task: &Task, work_dir: &Path) -> Result<NodeSnapshot> {
    let task_hash = TaskHasher::new(fs).hash(task, work_dir)?;
    let input_hash = input_hash(fs, task, work_dir)?;
    Ok(NodeSnapshot {
        name: task.name.clone(),
        task_hash,
        inputs: task.inputs.clone(),
        input_hash,
        env: task.env.clone(),
        command: task.command.clone(),
        outputs: task.outputs.clone(),
        upstream: task.upstream.iter().cloned().collect(),
    })
}

/// Builds a full [`GraphSnapshot`] over every task in `graph`.
pub fn snapshot_graph(fs: &dyn FileSystem, graph: &Graph, work_dir: &Path) -> Result<GraphSnapshot> {
    let mut map = GraphSnapshot::new();
    for task in graph.tasks() {
        map.insert(task.name.clone(), snapshot_task(fs, task, work_dir)?);
    }
    Ok(map)
}
