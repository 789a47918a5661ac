// src/resume.rs

//! Resume planner (§4.10): reconstructs a [`Plan`] from a prior run's
//! checkpoints, enforcing graph-hash continuity and restoring each
//! planned-reuse node's artifacts to disk the moment its decision is made,
//! strictly in topological order, so a downstream node's input hash is
//! always computed against real restored bytes rather than a stale or
//! absent work dir.
//!
//! Grounded on the plan builder (§4.5, `crate::plan`) plus the teacher's
//! `Scheduler::start_new_run` run-counter/run-id linkage pattern,
//! generalized to cross-run linkage via `previous_run_id` rather than an
//! in-process monotonic counter.

use std::collections::BTreeMap;
use std::path::Path;

use crate::cache::Cache;
use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::graph::model::Graph;
use crate::hash::task_hash::TaskHasher;
use crate::plan::{Decision, Plan};
use crate::recovery::records::{CheckpointRecord, RunId, RunRecord};
use crate::types::TaskName;

/// Topological order (lex tiebreak), shared with the plan builder's
/// internal helper — duplicated here rather than made `pub(crate)` there to
/// keep `plan` focused on the forward (non-resume) decision rule; both read
/// the same `Graph::dependencies_of`/`dependents_of` shape.
fn topo_order(graph: &Graph) -> Vec<TaskName> {
    use std::collections::{BTreeSet, VecDeque};

    let mut indegree: BTreeMap<&str, usize> = graph
        .task_names()
        .map(|n| (n, graph.dependencies_of(n).len()))
        .collect();

    let mut ready: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(k, _)| *k)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        let mut newly_ready = Vec::new();
        for dependent in graph.dependents_of(name) {
            if let Some(entry) = indegree.get_mut(dependent) {
                *entry -= 1;
                if *entry == 0 {
                    newly_ready.push(dependent);
                }
            }
        }
        newly_ready.sort_unstable();
        for n in newly_ready {
            ready.push_back(n);
        }
        ready = ready.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    }
    order
}

/// Verifies the integrity precondition for resume: the previous run's
/// recorded graph hash must equal the current graph's hash. A mismatch is
/// always rejected as a Validation (Structural) failure — never silently
/// accepted, per §4.9/§8 invariant 9.
pub fn check_graph_hash_continuity(previous_run: &RunRecord, current_graph_hash: &str) -> Result<()> {
    if previous_run.graph_hash != current_graph_hash {
        return Err(EngineError::structural(
            "graph_hash_mismatch",
            format!(
                "resume requested against run {} whose graph_hash {} does not match current graph_hash {current_graph_hash}",
                previous_run.run_id, previous_run.graph_hash
            ),
        ));
    }
    Ok(())
}

/// Builds a resume [`Plan`]: each node with a valid checkpoint whose first
/// cache key equals the current task hash, and whose cache entry still
/// exists, is `ReuseCache`; everything else is `Execute`.
///
/// Restoration ordering: before hashing a node whose upstream is planned
/// `ReuseCache`, that upstream's outputs must already be on disk (so input
/// hashing sees real bytes, not a missing-file error). This loop restores
/// a node's outputs to `work_dir` the moment its own decision comes back
/// `ReuseCache` — in the same topo-order pass that computes decisions,
/// before moving on to any node that might depend on it — rather than
/// deferring restoration to a later pass over the finished plan. A restore
/// failure demotes that node (and, transitively, everything depending on
/// it, since a demoted node can never satisfy "all upstream decisions ==
/// ReuseCache") to `Execute`.
///
/// Partial cherry-picking is a non-goal: this always plans the full graph.
/// `only_previously_failed` narrows nothing about which nodes *can* be
/// reused — per §9's resolved Open Question, cache presence is always
/// consulted regardless of prior status.
pub fn build_resume_plan(
    graph: &Graph,
    fs: &dyn FileSystem,
    work_dir: &Path,
    cache: &dyn Cache,
    checkpoints: &BTreeMap<TaskName, CheckpointRecord>,
) -> Result<Plan> {
    let order = topo_order(graph);
    let mut decisions: BTreeMap<TaskName, Decision> = BTreeMap::new();
    let hasher = TaskHasher::new(fs);

    for name in &order {
        let Some(task) = graph.task(name) else {
            decisions.insert(name.clone(), Decision::Execute);
            continue;
        };

        let upstream_all_reused = task
            .upstream
            .iter()
            .all(|u| decisions.get(u).copied() == Some(Decision::ReuseCache));

        let decision = if !upstream_all_reused {
            Decision::Execute
        } else {
            resolve_node(task, &hasher, fs, work_dir, cache, checkpoints)
        };
        decisions.insert(name.clone(), decision);
    }

    Ok(Plan { order, decisions })
}

/// Decides `task`'s plan entry and, when the decision comes back
/// `ReuseCache`, restores its outputs to `work_dir` immediately so the next
/// node in topo order sees them on disk. Falls back to `Execute` if the
/// restore itself fails, rather than handing the caller a plan that claims
/// ReuseCache without the bytes to back it.
fn resolve_node(
    task: &crate::graph::model::Task,
    hasher: &TaskHasher<'_>,
    fs: &dyn FileSystem,
    work_dir: &Path,
    cache: &dyn Cache,
    checkpoints: &BTreeMap<TaskName, CheckpointRecord>,
) -> Decision {
    let Some(checkpoint) = checkpoints.get(&task.name) else {
        return Decision::Execute;
    };
    if !checkpoint.valid {
        return Decision::Execute;
    }
    let Some(checkpoint_hash) = checkpoint.task_hash() else {
        return Decision::Execute;
    };

    // Every upstream this task depends on already had its outputs restored
    // by an earlier iteration of the loop in `build_resume_plan` (topo
    // order guarantees that), so this sees real input bytes even in a
    // fresh work dir with nothing left over from a previous run.
    let current_hash = match hasher.hash(task, work_dir) {
        Ok(h) => h,
        Err(_) => return Decision::Execute,
    };

    if current_hash != checkpoint_hash {
        return Decision::Execute;
    }
    if !cache.has(&current_hash) {
        return Decision::Execute;
    }
    if cache.restore(fs, task, &current_hash, work_dir).is_err() {
        return Decision::Execute;
    }
    Decision::ReuseCache
}

/// Produces the linked run record for a resumed run: `previous_run_id` set
/// to the resumed run's id, `retry_count` incremented by one.
pub fn link_resumed_run(
    new_run_id: RunId,
    graph_hash: crate::types::HashHex,
    mode: crate::recovery::records::RunMode,
    start_time_unix: u64,
    previous: &RunRecord,
) -> RunRecord {
    RunRecord {
        run_id: new_run_id,
        graph_hash,
        start_time_unix,
        mode,
        retry_count: previous.retry_count + 1,
        status: crate::recovery::records::RunStatus::Running,
        previous_run_id: Some(previous.run_id.clone()),
    }
}
