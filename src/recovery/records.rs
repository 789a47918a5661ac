// src/recovery/records.rs

//! Run / Checkpoint / Failure record types (§3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::types::{HashHex, TaskName};

/// Opaque 128-bit random run identifier, rendered as lowercase hex UUID.
/// Callers never parse structure out of it — it's compared for equality
/// and used as a storage key only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Clean,
    Incremental,
    Resume,
    ResumeFailedOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub graph_hash: HashHex,
    /// Recorded for auditing only; never consulted for any decision.
    pub start_time_unix: u64,
    pub mode: RunMode,
    pub retry_count: u32,
    pub status: RunStatus,
    pub previous_run_id: Option<RunId>,
}

/// Durable marker that a node completed successfully with a specific task
/// hash and cache-confirmed artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub node_id: TaskName,
    pub recorded_time_unix: u64,
    /// First element is always the task hash string.
    pub cache_keys: Vec<HashHex>,
    pub output_hash: HashHex,
    pub valid: bool,
}

impl CheckpointRecord {
    pub fn task_hash(&self) -> Option<&str> {
        self.cache_keys.first().map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FailureClass {
    GraphFailure,
    WorkspaceFailure,
    ExecutionFailure,
    SystemFailure,
}

impl FailureClass {
    /// Graph and Workspace failures are never resumable; Execution is
    /// conditionally resumable (decided by the caller); System is resumable
    /// iff checkpoints exist (also decided by the caller, who knows the
    /// checkpoint set).
    pub fn default_resumable(self) -> bool {
        !matches!(self, FailureClass::GraphFailure | FailureClass::WorkspaceFailure)
    }

    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Parse
            | ErrorKind::Schema
            | ErrorKind::Structural
            | ErrorKind::Semantic => FailureClass::GraphFailure,
            ErrorKind::Workspace => FailureClass::WorkspaceFailure,
            ErrorKind::Execution | ErrorKind::Cache => FailureClass::ExecutionFailure,
            ErrorKind::System | ErrorKind::Cancellation => FailureClass::SystemFailure,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failure_class: FailureClass,
    pub node_id: Option<TaskName>,
    pub error_code: String,
    pub message: String,
    pub resumable: bool,
}
