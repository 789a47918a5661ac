// src/trace.rs

//! Canonical trace (§4.8): an observational event log with canonical
//! ordering, serialization, and hashing that is byte-identical for
//! observationally equivalent runs, independent of concurrency settings or
//! commit-channel arrival order.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{HashHex, TaskName};

/// Closed set of trace event kinds, with a fixed precedence table used for
/// canonical ordering: `TaskInvalidated < TaskArtifactsRestored < TaskCached
/// < TaskExecuted < TaskFailed < TaskSkipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    TaskInvalidated,
    TaskArtifactsRestored,
    TaskCached,
    TaskExecuted,
    TaskFailed,
    TaskSkipped,
}

/// A single logical execution event, recorded at a state-commit boundary
/// (never a wall-clock event). Wall-clock time, durations, pointers, memory
/// addresses, and byte counts are forbidden fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub kind: EventKind,
    pub task_id: TaskName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_id: Option<TaskName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<String>>,
}

impl TraceEvent {
    pub fn new(kind: EventKind, task_id: impl Into<TaskName>) -> Self {
        Self {
            kind,
            task_id: task_id.into(),
            reason: None,
            cause_id: None,
            artifacts: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<TaskName>) -> Self {
        self.cause_id = Some(cause.into());
        self
    }

    /// Empty artifact lists normalize to absent per §4.8.
    pub fn with_artifacts(mut self, mut artifacts: Vec<String>) -> Self {
        if artifacts.is_empty() {
            self.artifacts = None;
        } else {
            artifacts.sort();
            self.artifacts = Some(artifacts);
        }
        self
    }

    fn sort_key(&self) -> (&str, u8, &str, &str, &[String]) {
        (
            self.task_id.as_str(),
            self.kind as u8,
            self.reason.as_deref().unwrap_or(""),
            self.cause_id.as_deref().unwrap_or(""),
            self.artifacts.as_deref().unwrap_or(&[]),
        )
    }
}

impl PartialOrd for TraceEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TraceEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Append-only recorder owned by a single coordinator (never shared across
/// worker threads). Recording never blocks the hot worker path and never
/// fails the run: serialization errors leave trace bytes empty rather than
/// aborting the graph result.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Finalizes into a canonical, sorted [`ExecutionTrace`].
    pub fn into_trace(mut self, graph_hash: HashHex) -> ExecutionTrace {
        self.events.sort();
        self.events.dedup();
        ExecutionTrace {
            graph_hash,
            events: self.events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrace {
    pub graph_hash: HashHex,
    pub events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    /// Canonical JSON bytes: fixed field order (`graphHash` then `events`),
    /// compact (no insignificant whitespace), absent optional fields
    /// omitted. Serialization failures return empty bytes rather than
    /// propagating an error, per §4.8's inertness guarantee.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn hash(&self) -> HashHex {
        let bytes = self.canonical_bytes();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        crate::hashutil::to_hex(hasher.finalize())
    }
}

/// Stable reason codes used on `TaskCached`/`TaskArtifactsRestored` events,
/// distinguishing a live cache-hit probe from a planned reuse restoration.
pub mod reason_codes {
    pub const CACHE_HIT: &str = "CacheHit";
    pub const PLANNED_REUSE_CACHE: &str = "PlannedReuseCache";
    pub const CACHE_REPLAY: &str = "CacheReplay";
    pub const CACHE_RESTORE: &str = "CacheRestore";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_artifacts_normalize_to_absent() {
        let event = TraceEvent::new(EventKind::TaskExecuted, "a").with_artifacts(Vec::new());
        assert_eq!(event.artifacts, None);
    }

    #[test]
    fn non_empty_artifacts_are_sorted() {
        let event = TraceEvent::new(EventKind::TaskExecuted, "a")
            .with_artifacts(vec!["b.txt".to_string(), "a.txt".to_string()]);
        assert_eq!(event.artifacts, Some(vec!["a.txt".to_string(), "b.txt".to_string()]));
    }

    #[test]
    fn event_kind_precedence_matches_declared_table() {
        assert!(EventKind::TaskInvalidated < EventKind::TaskArtifactsRestored);
        assert!(EventKind::TaskArtifactsRestored < EventKind::TaskCached);
        assert!(EventKind::TaskCached < EventKind::TaskExecuted);
        assert!(EventKind::TaskExecuted < EventKind::TaskFailed);
        assert!(EventKind::TaskFailed < EventKind::TaskSkipped);
    }

    #[test]
    fn recorder_sorts_events_by_canonical_key_regardless_of_recording_order() {
        let mut recorder = TraceRecorder::new();
        recorder.record(TraceEvent::new(EventKind::TaskExecuted, "b"));
        recorder.record(TraceEvent::new(EventKind::TaskExecuted, "a"));
        recorder.record(TraceEvent::new(EventKind::TaskInvalidated, "a"));

        let trace = recorder.into_trace("graph-hash".to_string());
        let ids_and_kinds: Vec<(&str, EventKind)> =
            trace.events.iter().map(|e| (e.task_id.as_str(), e.kind)).collect();
        assert_eq!(
            ids_and_kinds,
            vec![
                ("a", EventKind::TaskInvalidated),
                ("a", EventKind::TaskExecuted),
                ("b", EventKind::TaskExecuted),
            ]
        );
    }

    #[test]
    fn recorder_dedups_identical_events() {
        let mut recorder = TraceRecorder::new();
        recorder.record(TraceEvent::new(EventKind::TaskExecuted, "a"));
        recorder.record(TraceEvent::new(EventKind::TaskExecuted, "a"));
        let trace = recorder.into_trace("graph-hash".to_string());
        assert_eq!(trace.events.len(), 1);
    }

    #[test]
    fn trace_hash_is_stable_and_order_independent_of_recording_sequence() {
        let mut recorder_a = TraceRecorder::new();
        recorder_a.record(TraceEvent::new(EventKind::TaskExecuted, "b"));
        recorder_a.record(TraceEvent::new(EventKind::TaskExecuted, "a"));

        let mut recorder_b = TraceRecorder::new();
        recorder_b.record(TraceEvent::new(EventKind::TaskExecuted, "a"));
        recorder_b.record(TraceEvent::new(EventKind::TaskExecuted, "b"));

        let trace_a = recorder_a.into_trace("graph-hash".to_string());
        let trace_b = recorder_b.into_trace("graph-hash".to_string());
        assert_eq!(trace_a.hash(), trace_b.hash());
    }

    #[test]
    fn trace_hash_changes_when_graph_hash_changes() {
        let recorder = TraceRecorder::new();
        let trace_a = recorder.events().to_vec();
        let trace_a = ExecutionTrace { graph_hash: "hash-1".to_string(), events: trace_a.clone() };
        let trace_b = ExecutionTrace { graph_hash: "hash-2".to_string(), events: trace_a.events.clone() };
        assert_ne!(trace_a.hash(), trace_b.hash());
    }

    #[test]
    fn canonical_bytes_omit_absent_optional_fields() {
        let event = TraceEvent::new(EventKind::TaskExecuted, "a");
        let trace = ExecutionTrace { graph_hash: "g".to_string(), events: vec![event] };
        let json = String::from_utf8(trace.canonical_bytes()).unwrap();
        assert!(!json.contains("reason"));
        assert!(!json.contains("causeId"));
        assert!(!json.contains("artifacts"));
    }
}
