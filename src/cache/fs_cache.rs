// src/cache/fs_cache.rs

//! Reference on-disk cache backend: a two-level content-addressed blob
//! store plus a metadata file per task hash, grounded on the `cuenv`
//! cache module's CAS layout (`cas/<prefix>/<prefix2>/<hash>`) from
//! `other_examples`. Per original §1/§4.3, this layout is documented, not
//! prescriptive — callers may supply any [`Cache`] implementation.
//!
//! Atomicity: every write goes through a temp file in the same directory
//! followed by `fsync` + `rename`, so a crash mid-write never leaves a
//! partially-written entry visible to `has`/`get`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheEntry};
use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::graph::model::Task;
use crate::types::NodeResult;

#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    task_hash: String,
    exit_code: i32,
    stdout_blob: String,
    stderr_blob: String,
    /// (output path, blob hash) pairs, sorted by output path.
    artifacts: Vec<(String, String)>,
}

/// Content-addressed filesystem cache rooted at `root` (typically a
/// `.taskgraph/cache` directory under the workspace).
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    fn meta_path(&self, task_hash: &str) -> PathBuf {
        self.root.join("tasks").join(format!("{task_hash}.json"))
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.blobs_dir().join(&digest[0..2]).join(&digest[2..4]).join(digest)
    }

    fn put_blob(&self, content: &[u8]) -> Result<String> {
        let digest = blake3::hash(content).to_hex().to_string();
        let path = self.blob_path(&digest);
        if path.exists() {
            return Ok(digest);
        }
        write_atomic(&path, content)?;
        Ok(digest)
    }

    fn get_blob(&self, digest: &str) -> Result<Vec<u8>> {
        fs::read(self.blob_path(digest))
            .map_err(|e| EngineError::Cache(format!("reading blob {digest}: {e}")))
    }
}

impl Cache for FsCache {
    fn has(&self, task_hash: &str) -> bool {
        self.meta_path(task_hash).is_file()
    }

    fn get(&self, task_hash: &str) -> Option<CacheEntry> {
        let bytes = fs::read(self.meta_path(task_hash)).ok()?;
        let meta: StoredMetadata = serde_json::from_slice(&bytes).ok()?;
        let stdout = self.get_blob(&meta.stdout_blob).ok()?;
        let stderr = self.get_blob(&meta.stderr_blob).ok()?;
        let mut artifacts = Vec::with_capacity(meta.artifacts.len());
        for (output, digest) in &meta.artifacts {
            artifacts.push((output.clone(), self.get_blob(digest).ok()?));
        }
        Some(CacheEntry {
            task_hash: meta.task_hash,
            exit_code: meta.exit_code,
            stdout,
            stderr,
            artifacts,
        })
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        let stdout_blob = self.put_blob(&entry.stdout)?;
        let stderr_blob = self.put_blob(&entry.stderr)?;
        let mut artifacts = Vec::with_capacity(entry.artifacts.len());
        for (output, content) in &entry.artifacts {
            artifacts.push((output.clone(), self.put_blob(content)?));
        }
        artifacts.sort();

        let meta = StoredMetadata {
            task_hash: entry.task_hash.clone(),
            exit_code: entry.exit_code,
            stdout_blob,
            stderr_blob,
            artifacts,
        };
        let bytes = serde_json::to_vec(&meta)?;
        write_atomic(&self.meta_path(&entry.task_hash), &bytes)
    }

    fn restore(
        &self,
        fs_abstraction: &dyn FileSystem,
        task: &Task,
        task_hash: &str,
        work_dir: &Path,
    ) -> Result<NodeResult> {
        let entry = self.get(task_hash).ok_or_else(|| {
            EngineError::Cache(format!(
                "no cache entry for task '{}' with hash {task_hash}",
                task.name
            ))
        })?;

        for (output, content) in &entry.artifacts {
            let path = work_dir.join(output);
            fs_abstraction
                .write(&path, content)
                .map_err(|e| EngineError::Cache(format!("{e:#}")))?;
        }

        Ok(NodeResult {
            task_hash: entry.task_hash,
            exit_code: entry.exit_code,
            stdout: entry.stdout,
            stderr: entry.stderr,
            from_cache: true,
        })
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::Cache(format!("cache path has no parent: {}", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| EngineError::Cache(format!("{e}")))?;

    let tmp_path = parent.join(format!(
        ".tmp-{}-{}",
        std::process::id(),
        path.file_name().and_then(|n| n.to_str()).unwrap_or("entry")
    ));

    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| EngineError::Cache(format!("{e}")))?;
        file.write_all(content).map_err(|e| EngineError::Cache(format!("{e}")))?;
        file.sync_all().map_err(|e| EngineError::Cache(format!("{e}")))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| EngineError::Cache(format!("{e}")))?;
    Ok(())
}
