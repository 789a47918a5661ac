// src/recovery/mod.rs

//! Recovery store (§4.9): atomic on-disk Run/Checkpoint/Failure records
//! enabling resumable execution with graph-hash continuity.

pub mod fs_store;
pub mod records;

use crate::errors::Result;
use crate::types::TaskName;
use records::{CheckpointRecord, FailureRecord, RunId, RunRecord};
use std::collections::BTreeMap;

/// Recovery store contract. Only the coordinator writes (§5); reads are
/// safe from anywhere.
pub trait RecoveryStore: Send + Sync {
    /// Generates a fresh opaque 128-bit random run id.
    fn new_run_id(&self) -> RunId;

    fn start_run(&self, record: &RunRecord) -> Result<()>;

    /// Updates the run record's terminal status (and, for a failed run,
    /// leaves the failure record to `record_failure`).
    fn finish_run(&self, run_id: &RunId, status: records::RunStatus) -> Result<()>;

    fn record_failure(&self, run_id: &RunId, failure: &FailureRecord) -> Result<()>;

    /// Checkpoints are only written after (i) node exit 0, (ii) a confirmed
    /// cache entry exists for that task hash, (iii) the trace event for the
    /// task has already been appended — callers are responsible for that
    /// ordering; the store itself just persists atomically.
    fn save_checkpoint(&self, run_id: &RunId, checkpoint: &CheckpointRecord) -> Result<()>;

    fn load_run(&self, run_id: &RunId) -> Result<Option<RunRecord>>;

    fn load_all_checkpoints(&self, run_id: &RunId) -> Result<BTreeMap<TaskName, CheckpointRecord>>;

    fn list_run_ids(&self) -> Result<Vec<RunId>>;

    fn load_failure(&self, run_id: &RunId) -> Result<Option<FailureRecord>>;
}
