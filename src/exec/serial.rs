// src/exec/serial.rs

//! Serial executor (§4.7): one ready task at a time, lexicographic
//! tiebreak, decide-under-lock then execute-outside-lock, exactly
//! mirroring the teacher's active-task dispatch loop generalized from
//! "spawn a process per triggered task" to "probe/restore or run, then
//! commit".

use crate::errors::Result;
use crate::exec::observer::FaultBoundary;
use crate::exec::{decide_dispatch, hash_node, persist_to_cache, restore, DispatchKind, ExecutionContext, GraphResult, Shared};
use crate::scheduler::NodeState;

/// Runs `ctx.graph` to completion, one ready task at a time. If `ctx.plan`
/// is `None`, each node's cache presence is probed on the fly; if a plan is
/// present, its decisions are authoritative and no on-the-fly probing
/// happens (§4.7).
pub async fn run(ctx: &ExecutionContext<'_>) -> Result<GraphResult> {
    let shared = Shared::new(ctx.graph);
    let fault = FaultBoundary::new(ctx.observer);
    fault.before_run();

    loop {
        let ready = shared.ready(ctx.graph);
        let Some(name) = ready.into_iter().next() else {
            break;
        };

        let task = ctx
            .graph
            .task(&name)
            .expect("ready task name always resolves against the graph it was computed from");

        let task_hash = hash_node(ctx, task)?;

        match decide_dispatch(ctx, &name, &task_hash) {
            DispatchKind::Cache {
                cached_reason,
                restored_reason,
            } => {
                shared.commit_dispatch(ctx.graph, &name, NodeState::Cached)?;
                fault.before_node(&name);
                let outcome = restore(ctx, task, &task_hash);
                fault.after_node(&name);
                match outcome {
                    Ok(result) => {
                        let artifacts: Vec<String> = task.outputs.iter().cloned().collect();
                        shared.commit_cache_hit(&name, result, cached_reason, restored_reason, artifacts);
                    }
                    Err(_) => shared.commit_cache_restore_failed(ctx.graph, &name),
                }
            }
            DispatchKind::Execute => {
                shared.commit_dispatch(ctx.graph, &name, NodeState::Running)?;
                fault.before_node(&name);
                let outcome = ctx.runner.run(task, &task_hash, &ctx.work_dir).await;
                fault.after_node(&name);
                match outcome {
                    Ok(result) if result.is_success() => {
                        persist_to_cache(ctx, task, &result)?;
                        shared.commit_completed(&name, result)?;
                    }
                    Ok(result) => shared.commit_failed(ctx.graph, &name, Some(result)),
                    Err(err) => return Err(err),
                }
            }
        }
    }

    fault.after_run();
    debug_assert!(shared.is_terminal(), "serial loop exits only once every node is terminal");
    Ok(shared.into_result(ctx.graph_hash.clone()))
}
