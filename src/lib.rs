// src/lib.rs

//! Deterministic task-graph execution engine.
//!
//! The library is organized around the data flow described in the crate's
//! design notes: a graph definition is parsed, normalized, and hashed;
//! snapshots feed the invalidation analyzer and plan builder; the executor
//! drives the task runner against the resulting plan and scheduler state;
//! on completion the canonical trace is hashed and a Run record (plus,
//! per-task, Checkpoint records) is persisted. This module wires those
//! pieces into the handful of entry points the CLI binary calls.

pub mod cache;
pub mod cli;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod hashutil;
pub mod invalidation;
pub mod logging;
pub mod plan;
pub mod recovery;
pub mod resume;
pub mod scheduler;
pub mod snapshot;
pub mod trace;
pub mod types;

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::cache::fs_cache::FsCache;
use crate::cache::{Cache, CacheEntry};
use crate::errors::{EngineError, Result};
use crate::exec::{ExecutionContext, GraphResult, NullObserver, RealTaskRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::Graph;
use crate::recovery::fs_store::FsRecoveryStore;
use crate::recovery::records::{
    CheckpointRecord, FailureClass, FailureRecord, RunId, RunMode, RunRecord, RunStatus,
};
use crate::recovery::RecoveryStore;
use crate::scheduler::NodeState;
use crate::snapshot::GraphSnapshot;
use crate::types::HashHex;

/// A completed (or partially-failed) run together with the Run record it
/// was persisted under.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: GraphResult,
    pub run_record: RunRecord,
}

/// Reads and loads a graph document through the `FileSystem` abstraction,
/// the only supported entry point from untrusted bytes on disk.
pub fn load_graph(fs: &dyn FileSystem, path: &Path) -> Result<Graph> {
    let mut reader = fs
        .open_read(path)
        .map_err(|e| EngineError::Workspace(format!("reading graph document {}: {e:#}", path.display())))?;
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| EngineError::Workspace(e.to_string()))?;
    graph::load(&bytes)
}

/// Parses and validates the graph document; performs no execution. Used by
/// the `validate` CLI command.
pub fn validate_only(graph_path: &Path) -> Result<()> {
    let fs = RealFileSystem;
    load_graph(&fs, graph_path).map(|_| ())
}

/// Returns the graph hash. Deliberately takes no work-dir: the graph hash
/// is a pure function of the normalized graph body alone.
pub fn hash_only(graph_path: &Path) -> Result<HashHex> {
    let fs = RealFileSystem;
    let graph = load_graph(&fs, graph_path)?;
    Ok(graph::graph_hash(&graph))
}

/// Registered observer/hook capabilities. No dynamic plugin loading is
/// implemented — per the external-interfaces contract, `plugins list`
/// inspects a static, in-process registry only.
pub fn plugins_list() -> Vec<&'static str> {
    vec!["null"]
}

/// Runs the graph from a clean slate: every node plans implicitly as
/// `Execute` unless the executor's on-the-fly cache probe (no `Plan`
/// supplied) finds a hit.
pub async fn run_clean(
    graph_path: &Path,
    work_dir: &Path,
    cache_dir: &Path,
    recovery_dir: &Path,
    max_workers: usize,
) -> Result<RunOutcome> {
    let fs = RealFileSystem;
    let graph = load_graph(&fs, graph_path)?;
    let graph_hash = graph::graph_hash(&graph);
    let cache = FsCache::new(cache_dir);
    let recovery = FsRecoveryStore::new(recovery_dir);

    let run_id = recovery.new_run_id();
    let run_record = RunRecord {
        run_id: run_id.clone(),
        graph_hash: graph_hash.clone(),
        start_time_unix: now_unix(),
        mode: RunMode::Clean,
        retry_count: 0,
        status: RunStatus::Running,
        previous_run_id: None,
    };
    recovery.start_run(&run_record)?;

    let observer = NullObserver;
    let runner = RealTaskRunner;
    let ctx = ExecutionContext {
        graph: &graph,
        fs: &fs,
        cache: &cache,
        runner: &runner,
        work_dir: work_dir.to_path_buf(),
        plan: None,
        observer: &observer,
        graph_hash: graph_hash.clone(),
    };

    let result = dispatch(&ctx, max_workers).await?;
    finalize_run(&recovery, &cache, &run_id, &result)?;

    Ok(RunOutcome { result, run_record })
}

/// Runs the graph incrementally: builds a snapshot of the current graph,
/// compares it against the snapshot persisted by the last successful run
/// under `recovery_dir` (absent on the very first incremental run, which
/// then behaves like a clean run except every decision is authoritative
/// rather than probed), and executes against the resulting [`Plan`].
pub async fn run_incremental(
    graph_path: &Path,
    work_dir: &Path,
    cache_dir: &Path,
    recovery_dir: &Path,
    max_workers: usize,
) -> Result<RunOutcome> {
    let fs = RealFileSystem;
    let graph = load_graph(&fs, graph_path)?;
    let graph_hash = graph::graph_hash(&graph);
    let cache = FsCache::new(cache_dir);
    let recovery = FsRecoveryStore::new(recovery_dir);

    let new_snapshot = snapshot::snapshot_graph(&fs, &graph, work_dir)?;
    let snapshot_path = recovery_dir.join("snapshot.json");
    let old_snapshot = load_snapshot(&snapshot_path)?;

    let invalidation_map = invalidation::analyze(old_snapshot.as_ref(), &new_snapshot);
    let plan = plan::build_plan(&graph, &new_snapshot, &invalidation_map, &cache);

    let run_id = recovery.new_run_id();
    let run_record = RunRecord {
        run_id: run_id.clone(),
        graph_hash: graph_hash.clone(),
        start_time_unix: now_unix(),
        mode: RunMode::Incremental,
        retry_count: 0,
        status: RunStatus::Running,
        previous_run_id: None,
    };
    recovery.start_run(&run_record)?;

    let observer = NullObserver;
    let runner = RealTaskRunner;
    let ctx = ExecutionContext {
        graph: &graph,
        fs: &fs,
        cache: &cache,
        runner: &runner,
        work_dir: work_dir.to_path_buf(),
        plan: Some(&plan),
        observer: &observer,
        graph_hash: graph_hash.clone(),
    };

    let result = dispatch(&ctx, max_workers).await?;
    finalize_run(&recovery, &cache, &run_id, &result)?;
    save_snapshot(&snapshot_path, &new_snapshot)?;

    Ok(RunOutcome { result, run_record })
}

/// Resumes a previous run: rejects a graph-hash mismatch outright (§4.9),
/// otherwise reconstructs a [`Plan`] from the previous run's checkpoints
/// (restoring every planned-reuse node's outputs as it goes, see
/// [`resume::build_resume_plan`]), and executes.
///
/// `failed_only` never changes planning: per §9's resolved Open Question,
/// cache presence is always consulted regardless of prior per-node status.
/// It is still recorded faithfully in the resulting [`RunRecord`]'s `mode`
/// (`ResumeFailedOnly` vs `Resume`), so the caller's intent is observable
/// even though it doesn't narrow what gets reused.
pub async fn resume_run(
    graph_path: &Path,
    work_dir: &Path,
    cache_dir: &Path,
    recovery_dir: &Path,
    previous_run_id: &str,
    max_workers: usize,
    failed_only: bool,
) -> Result<RunOutcome> {
    let fs = RealFileSystem;
    let graph = load_graph(&fs, graph_path)?;
    let graph_hash = graph::graph_hash(&graph);
    let cache = FsCache::new(cache_dir);
    let recovery = FsRecoveryStore::new(recovery_dir);

    let prev_id = RunId::from_string(previous_run_id.to_string());
    let previous = recovery.load_run(&prev_id)?.ok_or_else(|| {
        EngineError::structural("unknown_run_id", format!("no run record for {previous_run_id}"))
    })?;
    resume::check_graph_hash_continuity(&previous, &graph_hash)?;

    let checkpoints = recovery.load_all_checkpoints(&prev_id)?;
    let plan = resume::build_resume_plan(&graph, &fs, work_dir, &cache, &checkpoints)?;

    let mode = if failed_only { RunMode::ResumeFailedOnly } else { RunMode::Resume };
    let run_id = recovery.new_run_id();
    let run_record = resume::link_resumed_run(run_id.clone(), graph_hash.clone(), mode, now_unix(), &previous);
    recovery.start_run(&run_record)?;

    let observer = NullObserver;
    let runner = RealTaskRunner;
    let ctx = ExecutionContext {
        graph: &graph,
        fs: &fs,
        cache: &cache,
        runner: &runner,
        work_dir: work_dir.to_path_buf(),
        plan: Some(&plan),
        observer: &observer,
        graph_hash: graph_hash.clone(),
    };

    let result = dispatch(&ctx, max_workers).await?;
    finalize_run(&recovery, &cache, &run_id, &result)?;

    Ok(RunOutcome { result, run_record })
}

async fn dispatch(ctx: &ExecutionContext<'_>, max_workers: usize) -> Result<GraphResult> {
    if max_workers <= 1 {
        exec::serial::run(ctx).await
    } else {
        exec::parallel::run(ctx, max_workers).await
    }
}

/// Writes a checkpoint for every node that finished `Completed`/`Cached`
/// with a confirmed cache entry, then finalizes the run record — failed iff
/// the graph result carries at least one `Failed` node.
fn finalize_run(recovery: &dyn RecoveryStore, cache: &dyn Cache, run_id: &RunId, result: &GraphResult) -> Result<()> {
    for (name, state) in &result.final_state {
        if !matches!(state, NodeState::Completed | NodeState::Cached) {
            continue;
        }
        let Some(node_result) = result.results.get(name) else {
            continue;
        };
        let Some(entry) = cache.get(&node_result.task_hash) else {
            continue;
        };
        let checkpoint = CheckpointRecord {
            node_id: name.clone(),
            recorded_time_unix: now_unix(),
            cache_keys: vec![node_result.task_hash.clone()],
            output_hash: artifacts_hash(&entry),
            valid: true,
        };
        recovery.save_checkpoint(run_id, &checkpoint)?;
    }

    if result.has_failure() {
        recovery.finish_run(run_id, RunStatus::Failed)?;
        let failed: Vec<_> = result
            .final_state
            .iter()
            .filter(|(_, s)| **s == NodeState::Failed)
            .map(|(n, _)| n.clone())
            .collect();
        let failure = FailureRecord {
            failure_class: FailureClass::ExecutionFailure,
            node_id: failed.first().cloned(),
            error_code: "task_failed".to_string(),
            message: format!("{} task(s) failed", failed.len()),
            resumable: true,
        };
        recovery.record_failure(run_id, &failure)?;
    } else {
        recovery.finish_run(run_id, RunStatus::Completed)?;
    }
    Ok(())
}

fn artifacts_hash(entry: &CacheEntry) -> HashHex {
    let mut hasher = Sha256::new();
    for (path, content) in &entry.artifacts {
        hasher.update(path.as_bytes());
        hasher.update(content);
    }
    hashutil::to_hex(hasher.finalize())
}

fn load_snapshot(path: &Path) -> Result<Option<GraphSnapshot>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn save_snapshot(path: &Path, snapshot: &GraphSnapshot) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot)?;
    write_atomic(path, &bytes)
}

/// Temp-file-then-rename write shared with the recovery store and cache
/// (`recovery::fs_store::write_atomic`, `cache::fs_cache::write_atomic`): a
/// crash mid-write leaves the original `snapshot.json` (or nothing) on disk,
/// never a torn file `load_snapshot` would fail to parse.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::System(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".tmp-{}-{}",
        std::process::id(),
        path.file_name().and_then(|n| n.to_str()).unwrap_or("snapshot")
    ));
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        std::io::Write::write_all(&mut file, bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugins_list_is_stable() {
        assert_eq!(plugins_list(), vec!["null"]);
    }
}
