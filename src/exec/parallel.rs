// src/exec/parallel.rs

//! Parallel executor (§4.7/§5): depth-staged dispatch with bounded worker
//! concurrency. Depth batches never overlap — every node of depth *d* is
//! fully resolved (terminal) before any node of depth *d+1* is dispatched —
//! but within a batch, up to `max_workers` nodes run concurrently.
//!
//! `ExecutionContext` borrows non-`'static` references (`&dyn FileSystem`,
//! `&dyn Cache`, ...), which rules out `tokio::spawn`/`JoinSet` (both
//! require `'static` futures). `futures::future::join_all` polls the
//! per-task futures in place instead of spawning them onto the runtime,
//! which is why this module reaches for `futures` rather than the teacher's
//! `tokio::task::JoinSet` worker-pool pattern — the same concurrency shape,
//! adapted to borrowed state.

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::errors::Result;
use crate::exec::observer::FaultBoundary;
use crate::exec::{decide_dispatch, depth_batches, hash_node, persist_to_cache, restore, DispatchKind, ExecutionContext, GraphResult, Shared};
use crate::scheduler::NodeState;
use crate::types::TaskName;

/// Runs `ctx.graph` to completion, dispatching each depth's ready tasks
/// concurrently with at most `max_workers` running at once. `max_workers ==
/// 1` must produce an execution order and trace identical to
/// [`super::serial::run`] (§8 invariant: parallel/serial equivalence), since
/// a single-permit semaphore serializes dispatch within every batch exactly
/// the way the serial loop does.
pub async fn run(ctx: &ExecutionContext<'_>, max_workers: usize) -> Result<GraphResult> {
    let max_workers = max_workers.max(1);
    let shared = Shared::new(ctx.graph);
    let fault = FaultBoundary::new(ctx.observer);
    fault.before_run();

    let semaphore = Semaphore::new(max_workers);
    let mut first_error: Option<crate::errors::EngineError> = None;

    'batches: for batch in depth_batches(ctx.graph) {
        let ready = shared.ready(ctx.graph);
        let candidates: Vec<TaskName> = batch.into_iter().filter(|n| ready.contains(n)).collect();
        if candidates.is_empty() {
            continue;
        }

        let futures = candidates.iter().map(|name| dispatch_one(ctx, &shared, &fault, &semaphore, name));
        let outcomes = join_all(futures).await;

        // Every sibling's own Failed/Completed/Cached state is already
        // committed by `dispatch_one`; skip propagation across the batch is
        // collected here and applied once, in lex order, so a descendant
        // shared by two failing siblings always attributes its skip to the
        // lexicographically-smallest one regardless of which future settled
        // first (§4.8 "Race-to-failure").
        let mut batch_failed: Vec<TaskName> = Vec::new();
        let mut batch_error: Option<crate::errors::EngineError> = None;
        for outcome in outcomes {
            match outcome {
                Ok(Some(failed_name)) => batch_failed.push(failed_name),
                Ok(None) => {}
                Err(err) => {
                    if batch_error.is_none() {
                        batch_error = Some(err);
                    }
                }
            }
        }
        shared.propagate_batch_failures(ctx.graph, &batch_failed);
        if let Some(err) = batch_error {
            first_error = Some(err);
            break 'batches;
        }
    }

    fault.after_run();
    if let Some(err) = first_error {
        return Err(err);
    }
    debug_assert!(shared.is_terminal(), "parallel loop exits only once every node is terminal");
    Ok(shared.into_result(ctx.graph_hash.clone()))
}

/// Resolves one node: acquires a worker permit, decides cache-vs-execute,
/// dispatches, and commits the result. Returns `Err` only for
/// infrastructure failures (a bad transition, a runner spawn error). A
/// failing exit code or a cache-restore failure is committed as a task
/// failure — state-only, no skip propagation yet (see
/// [`Shared::propagate_batch_failures`]) — and returns `Ok(Some(name))` so
/// the caller can batch it; a success or cache hit returns `Ok(None)`.
async fn dispatch_one(
    ctx: &ExecutionContext<'_>,
    shared: &Shared,
    fault: &FaultBoundary<'_>,
    semaphore: &Semaphore,
    name: &str,
) -> Result<Option<TaskName>> {
    let _permit = semaphore
        .acquire()
        .await
        .expect("semaphore is never closed during a run");

    let task = ctx
        .graph
        .task(name)
        .expect("batch task name always resolves against the graph it was computed from");
    let owned_name: TaskName = name.to_string();

    let task_hash = hash_node(ctx, task)?;

    match decide_dispatch(ctx, name, &task_hash) {
        DispatchKind::Cache {
            cached_reason,
            restored_reason,
        } => {
            shared.commit_dispatch(ctx.graph, name, NodeState::Cached)?;
            fault.before_node(&owned_name);
            let outcome = restore(ctx, task, &task_hash);
            fault.after_node(&owned_name);
            match outcome {
                Ok(result) => {
                    let artifacts: Vec<String> = task.outputs.iter().cloned().collect();
                    shared.commit_cache_hit(&owned_name, result, cached_reason, restored_reason, artifacts);
                    Ok(None)
                }
                Err(_) => {
                    shared.commit_cache_restore_failed_state_only(&owned_name);
                    Ok(Some(owned_name))
                }
            }
        }
        DispatchKind::Execute => {
            shared.commit_dispatch(ctx.graph, name, NodeState::Running)?;
            fault.before_node(&owned_name);
            let outcome = ctx.runner.run(task, &task_hash, &ctx.work_dir).await;
            fault.after_node(&owned_name);
            match outcome {
                Ok(result) if result.is_success() => {
                    persist_to_cache(ctx, task, &result)?;
                    shared.commit_completed(&owned_name, result)?;
                    Ok(None)
                }
                Ok(result) => {
                    shared.commit_failed_state_only(&owned_name, Some(result));
                    Ok(Some(owned_name))
                }
                Err(err) => Err(err),
            }
        }
    }
}
