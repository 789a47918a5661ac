#![allow(dead_code)]

//! A fake [`TaskRunner`] that records which tasks were run and replays a
//! scripted outcome instead of spawning a real process, grounded on the
//! teacher's `FakeExecutor` (records invocations, reports a canned
//! `TaskOutcome` over the runtime channel) generalized from "report success
//! over a channel" to "return a scripted `NodeResult` and materialize any
//! declared output files", since downstream task hashing needs real bytes
//! on disk to hash.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use taskgraph::errors::{EngineError, Result};
use taskgraph::exec::TaskRunner;
use taskgraph::graph::Task;
use taskgraph::types::NodeResult;

/// Scripted result for one task invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Output path (relative to the task's work dir) to content. Written to
    /// disk on run so that inputs declared by downstream tasks hash real
    /// bytes, the same way a real shell command would leave files behind.
    pub outputs: BTreeMap<String, Vec<u8>>,
}

impl ScriptedOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn with_output(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.outputs.insert(path.to_string(), content.into());
        self
    }
}

/// Deterministic stand-in for [`taskgraph::exec::RealTaskRunner`]. Tasks
/// with no registered script default to a zero-exit success with no
/// outputs written.
#[derive(Default)]
pub struct FakeTaskRunner {
    scripts: Mutex<BTreeMap<String, ScriptedOutcome>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl FakeTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, task_name: &str, outcome: ScriptedOutcome) -> &Self {
        self.scripts
            .lock()
            .expect("scripts lock poisoned")
            .insert(task_name.to_string(), outcome);
        self
    }

    /// Task names passed to `run`, in invocation order, for asserting which
    /// tasks actually executed (as opposed to being restored from cache).
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().expect("executed lock poisoned").clone()
    }
}

impl TaskRunner for FakeTaskRunner {
    fn run<'a>(
        &'a self,
        task: &'a Task,
        task_hash: &'a str,
        work_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<NodeResult>> + Send + 'a>> {
        Box::pin(async move {
            self.executed
                .lock()
                .expect("executed lock poisoned")
                .push(task.name.clone());

            let outcome = self
                .scripts
                .lock()
                .expect("scripts lock poisoned")
                .get(&task.name)
                .cloned()
                .unwrap_or_default();

            for (path, content) in &outcome.outputs {
                let full_path = work_dir.join(path);
                if let Some(parent) = full_path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        EngineError::Execution(format!(
                            "creating output dir for task '{}': {e}",
                            task.name
                        ))
                    })?;
                }
                std::fs::write(&full_path, content).map_err(|e| {
                    EngineError::Execution(format!(
                        "writing output '{path}' for task '{}': {e}",
                        task.name
                    ))
                })?;
            }

            Ok(NodeResult {
                task_hash: task_hash.to_string(),
                exit_code: outcome.exit_code,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
                from_cache: false,
            })
        })
    }
}
