// src/exec/mod.rs

//! DAG executor (§4.7): a state machine scheduling tasks serially or in
//! parallel with deterministic ordering, probing or restoring from cache,
//! propagating failures, and enforcing single-coordinator ownership of
//! mutable state.

pub mod observer;
pub mod parallel;
pub mod runner;
pub mod serial;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::cache::{Cache, CacheEntry};
use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::graph::model::Graph;
use crate::plan::{Decision, Plan};
use crate::scheduler::{self, NodeState, StateMap};
use crate::trace::{reason_codes, EventKind, ExecutionTrace, TraceEvent, TraceRecorder};
use crate::types::{HashHex, NodeResult, TaskName};

pub use observer::{NullObserver, Observer};
pub use runner::{RealTaskRunner, TaskRunner};

/// Final output of a run (§4.7 contract): graph hash, final state map,
/// dispatch order, per-task results, canonical trace bytes, and trace hash.
#[derive(Debug, Clone)]
pub struct GraphResult {
    pub graph_hash: HashHex,
    pub final_state: StateMap,
    pub execution_order: Vec<TaskName>,
    pub results: BTreeMap<TaskName, NodeResult>,
    pub trace_bytes: Vec<u8>,
    pub trace_hash: HashHex,
}

impl GraphResult {
    pub fn has_failure(&self) -> bool {
        self.final_state.values().any(|s| *s == NodeState::Failed)
    }
}

/// Everything the executor needs to run a graph, grouped to keep function
/// signatures manageable across serial/parallel call sites.
pub struct ExecutionContext<'a> {
    pub graph: &'a Graph,
    pub fs: &'a dyn FileSystem,
    pub cache: &'a dyn Cache,
    pub runner: &'a dyn TaskRunner,
    pub work_dir: PathBuf,
    pub plan: Option<&'a Plan>,
    pub observer: &'a dyn Observer,
    pub graph_hash: HashHex,
}

/// State shared across worker threads/tasks, exclusively mutated by the
/// coordinator under one mutex (§5): state map, execution order, result
/// map, and trace recorder all commit together.
pub(crate) struct Shared {
    pub state: Mutex<StateMap>,
    pub order: Mutex<Vec<TaskName>>,
    pub results: Mutex<BTreeMap<TaskName, NodeResult>>,
    pub trace: Mutex<TraceRecorder>,
}

impl Shared {
    pub fn new(graph: &Graph) -> Self {
        Self {
            state: Mutex::new(scheduler::initial_state_map(graph)),
            order: Mutex::new(Vec::new()),
            results: Mutex::new(BTreeMap::new()),
            trace: Mutex::new(TraceRecorder::new()),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StateMap> {
        self.state.lock().expect("state mutex poisoned")
    }

    pub fn ready(&self, graph: &Graph) -> Vec<TaskName> {
        let state = self.lock_state();
        scheduler::ready(&state, graph)
    }

    pub fn commit_dispatch(&self, graph: &Graph, name: &str, to: NodeState) -> Result<()> {
        let mut state = self.lock_state();
        scheduler::transition(&mut state, name, NodeState::Pending, to)?;
        drop(state);
        self.order.lock().expect("order mutex poisoned").push(name.to_string());
        let _ = graph;
        Ok(())
    }

    /// Commits a successful cache hit. The node's state was already set to
    /// `Cached` (a terminal state) at dispatch time by `commit_dispatch`, so
    /// this only records the result and the two trace events §4.8 specifies
    /// for a cache-hit commit (`TaskCached` then `TaskArtifactsRestored`) —
    /// no further state transition is needed or legal.
    pub fn commit_cache_hit(
        &self,
        task: &TaskName,
        result: NodeResult,
        cached_reason: &str,
        restored_reason: &str,
        artifacts: Vec<String>,
    ) {
        self.results.lock().expect("results mutex poisoned").insert(task.clone(), result);
        let mut trace = self.trace.lock().expect("trace mutex poisoned");
        trace.record(TraceEvent::new(EventKind::TaskCached, task.clone()).with_reason(cached_reason));
        trace.record(
            TraceEvent::new(EventKind::TaskArtifactsRestored, task.clone())
                .with_reason(restored_reason)
                .with_artifacts(artifacts),
        );
    }

    /// Commits a restoration failure for a node already dispatched `Cached`
    /// (§4.7: the cache's `has() == true` implied `restore()` would
    /// succeed, but it didn't). This is the one documented exception to
    /// "no state leaves a terminal state" — `Cached` is demoted to
    /// `Failed` so downstream propagation stays deterministic, per §7's
    /// restoration-failure rule.
    pub fn commit_cache_restore_failed(&self, graph: &Graph, task: &TaskName) {
        let skipped = {
            let mut state = self.lock_state();
            scheduler::fail_cached_restore(&mut state, graph, task)
        };
        let mut trace = self.trace.lock().expect("trace mutex poisoned");
        trace.record(TraceEvent::new(EventKind::TaskFailed, task.clone()));
        for (descendant, cause) in skipped {
            trace.record(TraceEvent::new(EventKind::TaskSkipped, descendant).with_cause(cause));
        }
    }

    pub fn commit_completed(&self, task: &TaskName, result: NodeResult) -> Result<()> {
        {
            let mut state = self.lock_state();
            scheduler::transition(&mut state, task, NodeState::Running, NodeState::Completed)?;
        }
        self.results.lock().expect("results mutex poisoned").insert(task.clone(), result);
        self.trace
            .lock()
            .expect("trace mutex poisoned")
            .record(TraceEvent::new(EventKind::TaskExecuted, task.clone()));
        Ok(())
    }

    /// Commits a non-zero exit / restoration failure: marks the task
    /// Failed, propagates Skipped to its still-Pending descendants, and
    /// records the corresponding trace events.
    pub fn commit_failed(&self, graph: &Graph, task: &TaskName, result: Option<NodeResult>) {
        if let Some(result) = &result {
            self.results.lock().expect("results mutex poisoned").insert(task.clone(), result.clone());
        }
        let skipped = {
            let mut state = self.lock_state();
            scheduler::fail_and_propagate(&mut state, graph, task)
        };
        let mut trace = self.trace.lock().expect("trace mutex poisoned");
        trace.record(TraceEvent::new(EventKind::TaskFailed, task.clone()));
        for (descendant, cause) in skipped {
            trace.record(TraceEvent::new(EventKind::TaskSkipped, descendant).with_cause(cause));
        }
    }

    /// Marks a non-zero exit as Failed and records its `TaskFailed` event,
    /// but does *not* propagate skips to descendants. Used by the parallel
    /// executor: within one depth batch, siblings fail concurrently and
    /// independently (none is a descendant of another, by construction of
    /// depth staging), so marking is safe immediately, but skip propagation
    /// must wait until the whole batch has settled — see
    /// [`Shared::propagate_batch_failures`], which fixes the skip-cause
    /// deterministically instead of letting it depend on which sibling's
    /// async task happens to commit first (§4.8 "Race-to-failure").
    pub fn commit_failed_state_only(&self, task: &TaskName, result: Option<NodeResult>) {
        if let Some(result) = &result {
            self.results.lock().expect("results mutex poisoned").insert(task.clone(), result.clone());
        }
        {
            let mut state = self.lock_state();
            scheduler::mark_failed(&mut state, task);
        }
        self.trace
            .lock()
            .expect("trace mutex poisoned")
            .record(TraceEvent::new(EventKind::TaskFailed, task.clone()));
    }

    /// The restoration-failure counterpart of [`commit_failed_state_only`]:
    /// demotes a `Cached` node to `Failed` and records `TaskFailed`, again
    /// deferring skip propagation to [`Shared::propagate_batch_failures`].
    pub fn commit_cache_restore_failed_state_only(&self, task: &TaskName) {
        {
            let mut state = self.lock_state();
            scheduler::mark_cached_restore_failed(&mut state, task);
        }
        self.trace
            .lock()
            .expect("trace mutex poisoned")
            .record(TraceEvent::new(EventKind::TaskFailed, task.clone()));
    }

    /// Propagates Skipped to every still-Pending descendant of `failed`,
    /// called once per completed depth batch. `failed` is sorted
    /// lexicographically before propagating so that a descendant reachable
    /// from more than one failing sibling in the same batch is always
    /// attributed to the lexicographically-smallest one: `propagate_skips`
    /// only ever skips a still-`Pending` node once, so whichever name is
    /// processed first "wins" the cause — fixing that order to sort order
    /// makes the result independent of dispatch/lock-acquisition order
    /// (§4.8 "Race-to-failure", §8 scenario S5).
    pub fn propagate_batch_failures(&self, graph: &Graph, failed: &[TaskName]) {
        if failed.is_empty() {
            return;
        }
        let mut sorted = failed.to_vec();
        sorted.sort();

        let mut events = Vec::new();
        {
            let mut state = self.lock_state();
            for name in &sorted {
                for (descendant, cause) in scheduler::propagate_skips(&mut state, graph, name) {
                    events.push(TraceEvent::new(EventKind::TaskSkipped, descendant).with_cause(cause));
                }
            }
        }
        let mut trace = self.trace.lock().expect("trace mutex poisoned");
        for event in events {
            trace.record(event);
        }
    }

    pub fn is_terminal(&self) -> bool {
        scheduler::is_terminal(&self.lock_state())
    }

    pub fn into_result(self, graph_hash: HashHex) -> GraphResult {
        let final_state = self.state.into_inner().expect("state mutex poisoned");
        let execution_order = self.order.into_inner().expect("order mutex poisoned");
        let results = self.results.into_inner().expect("results mutex poisoned");
        let trace = self.trace.into_inner().expect("trace mutex poisoned");
        let trace = trace.into_trace(graph_hash.clone());
        let trace_bytes = trace.canonical_bytes();
        let trace_hash = trace.hash();
        GraphResult {
            graph_hash,
            final_state,
            execution_order,
            results,
            trace_bytes,
            trace_hash,
        }
    }
}

/// Which of the two node lifecycles (§3: `Pending -> Running -> {Completed,
/// Failed}` or `Pending -> Cached`) a given dispatch should follow, and the
/// reason codes §4.8 assigns to whichever trace events that path produces.
pub(crate) enum DispatchKind {
    Cache {
        cached_reason: &'static str,
        restored_reason: &'static str,
    },
    Execute,
}

/// Decides dispatch kind for a node about to leave `Pending`. When a plan
/// is authoritative (§4.7: "cache probing on the fly is skipped"), the
/// plan's decision is followed exactly — an `Execute` decision never
/// consults the cache. When no plan was supplied, the executor probes the
/// cache itself before falling back to execution.
pub(crate) fn decide_dispatch(ctx: &ExecutionContext<'_>, name: &str, task_hash: &str) -> DispatchKind {
    match ctx.plan {
        Some(plan) => match plan.decision(name) {
            Some(Decision::ReuseCache) => DispatchKind::Cache {
                cached_reason: reason_codes::PLANNED_REUSE_CACHE,
                restored_reason: reason_codes::CACHE_RESTORE,
            },
            _ => DispatchKind::Execute,
        },
        None => {
            if ctx.cache.has(task_hash) {
                DispatchKind::Cache {
                    cached_reason: reason_codes::CACHE_HIT,
                    restored_reason: reason_codes::CACHE_REPLAY,
                }
            } else {
                DispatchKind::Execute
            }
        }
    }
}

/// Computes a task's current task hash against the execution context's
/// filesystem/work-dir, wrapping the error so a missing declared input
/// surfaces distinctly from a scheduler/state error.
pub(crate) fn hash_node(ctx: &ExecutionContext<'_>, task: &crate::graph::model::Task) -> Result<HashHex> {
    crate::hash::hash_task(ctx.fs, task, &ctx.work_dir)
}

/// Restores a `Cache`-dispatched node's artifacts. A restoration failure is
/// reported as a task failure (not an executor error) so downstream
/// propagation stays deterministic, per §4.7/§7.
pub(crate) fn restore(
    ctx: &ExecutionContext<'_>,
    task: &crate::graph::model::Task,
    task_hash: &str,
) -> Result<NodeResult> {
    ctx.cache
        .restore(ctx.fs, task, task_hash, &ctx.work_dir)
        .map_err(|e| EngineError::Execution(format!("cache restore failed for '{}': {e}", task.name)))
}

pub fn canonicalize_trace(graph_hash: HashHex, recorder: TraceRecorder) -> ExecutionTrace {
    recorder.into_trace(graph_hash)
}

/// Reads a freshly-executed task's declared output files back off disk and
/// writes a [`CacheEntry`] for them, making the task hash just computed a
/// valid future cache key. This is the executor's responsibility (not the
/// cache backend's) because only the executor knows, at the moment of a
/// successful exit, which task hash the just-produced bytes belong to.
pub(crate) fn persist_to_cache(
    ctx: &ExecutionContext<'_>,
    task: &crate::graph::model::Task,
    result: &NodeResult,
) -> Result<()> {
    use std::io::Read;

    let mut artifacts = Vec::with_capacity(task.outputs.len());
    for output in &task.outputs {
        let path = ctx.work_dir.join(output);
        let mut reader = ctx.fs.open_read(&path).map_err(|e| {
            EngineError::Cache(format!(
                "reading declared output '{output}' for task '{}': {e:#}",
                task.name
            ))
        })?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| EngineError::Cache(e.to_string()))?;
        artifacts.push((output.clone(), buf));
    }
    artifacts.sort();

    ctx.cache.put(CacheEntry {
        task_hash: result.task_hash.clone(),
        exit_code: result.exit_code,
        stdout: result.stdout.clone(),
        stderr: result.stderr.clone(),
        artifacts,
    })
}

/// Depth-staged dispatch order (§4.7/§5): depth 0 is roots, depth(n) = 1 +
/// max(depth of upstreams). Returns task names grouped by depth, each group
/// already sorted lexicographically — the batch the parallel dispatcher
/// processes one at a time, with no cross-depth overlap.
pub(crate) fn depth_batches(graph: &Graph) -> Vec<Vec<TaskName>> {
    let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
    let order = topo_order_names(graph);
    for name in &order {
        let d = graph
            .dependencies_of(name)
            .iter()
            .map(|dep| depth.get(dep.as_str()).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depth.insert(name.as_str(), d);
    }

    let max_depth = depth.values().copied().max();
    let Some(max_depth) = max_depth else {
        return Vec::new();
    };
    let mut batches: Vec<Vec<TaskName>> = vec![Vec::new(); max_depth + 1];
    for name in &order {
        batches[depth[name.as_str()]].push(name.clone());
    }
    for batch in &mut batches {
        batch.sort();
    }
    batches
}

fn topo_order_names(graph: &Graph) -> Vec<TaskName> {
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
