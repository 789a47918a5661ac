// src/exec/runner.rs

//! Task runner abstraction: the collaborator that actually executes a
//! task's command. Grounded on the teacher's `exec::task_runner` process-
//! spawning style (shell-invoked, piped stdout/stderr, `kill_on_drop`),
//! generalized from "fire an event at the runtime" to "return a
//! `NodeResult`" since this engine has no long-lived/progress task concept.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::errors::{EngineError, Result};
use crate::graph::model::Task;
use crate::types::NodeResult;

/// Runs a task's declared command against a working directory and returns
/// its outcome. A `nil`/absent result is treated by the executor as an
/// infrastructure error (never as a task failure) — this trait's `run`
/// therefore always returns a `NodeResult` on `Ok`, reserving `Err` for
/// runner-level infrastructure failures (spawn failure, I/O error).
pub trait TaskRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        task: &'a Task,
        task_hash: &'a str,
        work_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<NodeResult>> + Send + 'a>>;
}

/// Production runner: spawns the task's command through a shell
/// (`sh -c` on Unix, `cmd /C` on Windows), captures stdout/stderr in full,
/// and maps the process's declared env on top of the current environment.
#[derive(Debug, Clone, Default)]
pub struct RealTaskRunner;

impl TaskRunner for RealTaskRunner {
    fn run<'a>(
        &'a self,
        task: &'a Task,
        task_hash: &'a str,
        work_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<NodeResult>> + Send + 'a>> {
        Box::pin(async move {
            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&task.command);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&task.command);
                c
            };

            cmd.current_dir(work_dir)
                .envs(task.env.iter())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|e| {
                EngineError::Execution(format!(
                    "spawning process for task '{}': {e}",
                    task.name
                ))
            })?;

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                out.read_to_end(&mut stdout).await.map_err(|e| {
                    EngineError::Execution(format!("reading stdout for '{}': {e}", task.name))
                })?;
            }
            if let Some(mut err) = child.stderr.take() {
                err.read_to_end(&mut stderr).await.map_err(|e| {
                    EngineError::Execution(format!("reading stderr for '{}': {e}", task.name))
                })?;
            }

            let status = child.wait().await.map_err(|e| {
                EngineError::Execution(format!(
                    "waiting for process of task '{}': {e}",
                    task.name
                ))
            })?;

            Ok(NodeResult {
                task_hash: task_hash.to_string(),
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
                from_cache: false,
            })
        })
    }
}
