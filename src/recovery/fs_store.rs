// src/recovery/fs_store.rs

//! Atomic filesystem-backed [`RecoveryStore`], grounded on the teacher's
//! `watch::hash::{save_all_hashes, load_all_hashes}` file-persistence
//! pattern, generalized to three record kinds (Run, Checkpoint, Failure)
//! each written with write-to-temp + fsync + rename.
//!
//! Layout (collaborator concern, not prescribed by the core, per §6): one
//! directory per run, `run.json`, `checkpoints/<node_id>.json`, optional
//! `failure.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{EngineError, Result};
use crate::recovery::records::{CheckpointRecord, FailureRecord, RunId, RunRecord, RunStatus};
use crate::recovery::RecoveryStore;
use crate::types::TaskName;

#[derive(Debug, Clone)]
pub struct FsRecoveryStore {
    root: PathBuf,
}

impl FsRecoveryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str())
    }

    fn run_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("run.json")
    }

    fn checkpoint_path(&self, run_id: &RunId, node_id: &str) -> PathBuf {
        self.run_dir(run_id)
            .join("checkpoints")
            .join(format!("{}.json", sanitize(node_id)))
    }

    fn failure_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("failure.json")
    }
}

/// Node ids are already validated task names (no path separators per the
/// graph contract), but this guards the on-disk layout regardless.
fn sanitize(node_id: &str) -> String {
    node_id.replace(['/', '\\'], "_")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::System(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".tmp-{}-{}",
        std::process::id(),
        path.file_name().and_then(|n| n.to_str()).unwrap_or("record")
    ));
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

impl RecoveryStore for FsRecoveryStore {
    fn new_run_id(&self) -> RunId {
        RunId::new_random()
    }

    fn start_run(&self, record: &RunRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.run_path(&record.run_id), &bytes)
    }

    fn finish_run(&self, run_id: &RunId, status: RunStatus) -> Result<()> {
        let mut record = self.load_run(run_id)?.ok_or_else(|| {
            EngineError::System(format!("no run record for {run_id} to finish"))
        })?;
        record.status = status;
        let bytes = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.run_path(run_id), &bytes)
    }

    fn record_failure(&self, run_id: &RunId, failure: &FailureRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(failure)?;
        write_atomic(&self.failure_path(run_id), &bytes)
    }

    fn save_checkpoint(&self, run_id: &RunId, checkpoint: &CheckpointRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&self.checkpoint_path(run_id, &checkpoint.node_id), &bytes)
    }

    fn load_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        read_json(&self.run_path(run_id))
    }

    fn load_all_checkpoints(&self, run_id: &RunId) -> Result<BTreeMap<TaskName, CheckpointRecord>> {
        let dir = self.run_dir(run_id).join("checkpoints");
        let mut out = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(checkpoint) = read_json::<CheckpointRecord>(&path)? {
                out.insert(checkpoint.node_id.clone(), checkpoint);
            }
        }
        Ok(out)
    }

    fn list_run_ids(&self) -> Result<Vec<RunId>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(RunId::from_string(name.to_string()));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn load_failure(&self, run_id: &RunId) -> Result<Option<FailureRecord>> {
        read_json(&self.failure_path(run_id))
    }
}
