// src/hash/task_hash.rs

//! Task hasher (§4.2): derives the stable cache key / invalidation identity
//! for a task from its resolved input contents, command, env, outputs, and
//! working-directory identity.
//!
//! Input resolution goes through the [`FileSystem`] abstraction (the same
//! trait object the graph loader and cache backends use), so the hasher is
//! fully testable against a [`crate::fs::mock::MockFileSystem`] without
//! touching the real filesystem. Content digests use BLAKE3 (fast, stream-
//! friendly for large files); the combining hash stays SHA-256 to match the
//! other structural hashes (graph hash, plan hash, trace hash) this crate
//! exposes as SHA-256 hex per the external contract.

use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::graph::model::Task;
use crate::hash::workdir::WorkdirIdentity;
use crate::types::HashHex;

/// Resolves and hashes task inputs against a [`FileSystem`].
pub struct TaskHasher<'a> {
    fs: &'a dyn FileSystem,
}

#[derive(Serialize)]
struct CanonicalTaskHashInput<'a> {
    input_digests: Vec<(&'a str, String)>,
    command: &'a str,
    env: &'a std::collections::BTreeMap<String, String>,
    outputs: Vec<&'a str>,
    work_dir: &'a str,
}

impl<'a> TaskHasher<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Resolves every declared input under `work_dir`, hashing its content
    /// with BLAKE3 (symlinks are followed to their target bytes since
    /// `open_read` reads through the filesystem abstraction, not the link
    /// itself), then combines everything into the stable task hash.
    ///
    /// Missing declared inputs are a Workspace error raised before any
    /// hashing happens, per §4.2's edge-case rule.
    pub fn hash(&self, task: &Task, work_dir: &Path) -> Result<HashHex> {
        let mut input_digests: Vec<(&str, String)> = Vec::with_capacity(task.inputs.len());

        for input in &task.inputs {
            let path = work_dir.join(input);
            if !self.fs.exists(&path) {
                return Err(EngineError::Workspace(format!(
                    "declared input '{input}' for task '{}' does not exist under {}",
                    task.name,
                    work_dir.display()
                )));
            }
            let digest = self.hash_file(&path)?;
            input_digests.push((input.as_str(), digest));
        }
        // Declared inputs are already a `BTreeSet`, so iteration is already
        // sorted by path; no separate sort needed.

        let identity = WorkdirIdentity::resolve(self.fs, work_dir)?;
        Ok(combine(
            &input_digests,
            &task.command,
            &task.env,
            &task.outputs,
            &identity,
        ))
    }

    fn hash_file(&self, path: &Path) -> Result<String> {
        let mut reader = self
            .fs
            .open_read(path)
            .map_err(|e| EngineError::Workspace(format!("{e:#}")))?;
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| EngineError::Workspace(e.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

fn combine(
    input_digests: &[(&str, String)],
    command: &str,
    env: &std::collections::BTreeMap<String, String>,
    outputs: &std::collections::BTreeSet<String>,
    work_dir: &WorkdirIdentity,
) -> HashHex {
    let canonical = CanonicalTaskHashInput {
        input_digests: input_digests.to_vec(),
        command,
        env,
        outputs: outputs.iter().map(|s| s.as_str()).collect(),
        work_dir: work_dir.as_str(),
    };
    let bytes =
        serde_json::to_vec(&canonical).expect("canonical task hash input is always valid JSON");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    crate::hashutil::to_hex(hasher.finalize())
}

/// Convenience free function mirroring [`TaskHasher::hash`] for call sites
/// that don't otherwise need to hold on to a hasher value.
pub fn hash_task(fs: &dyn FileSystem, task: &Task, work_dir: &Path) -> Result<HashHex> {
    TaskHasher::new(fs).hash(task, work_dir)
}
