// src/scheduler.rs

//! Scheduler state machine (§4.6): per-node lifecycle with append-only
//! transitions and failure propagation. Pure over an explicit [`StateMap`]
//! — no global mutable state, per §5.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::errors::{EngineError, Result};
use crate::graph::model::Graph;
use crate::types::TaskName;

/// Node lifecycle state (§3). `Pending -> {Running, Cached} ->
/// {Completed, Failed, Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    Pending,
    Running,
    Cached,
    Completed,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Completed | NodeState::Cached | NodeState::Failed | NodeState::Skipped
        )
    }
}

/// Map of task name to its current lifecycle state. One entry per node of
/// the graph the scheduler was built against.
pub type StateMap = BTreeMap<TaskName, NodeState>;

pub fn initial_state_map(graph: &Graph) -> StateMap {
    graph
        .task_names()
        .map(|name| (name.to_string(), NodeState::Pending))
        .collect()
}

/// Returns the direct upstream names whose lifecycle state satisfies
/// readiness (`{Completed, Cached}`) for `name`, i.e. this checks only one
/// node; see [`ready`] for the batch, sorted form used by the executor.
fn upstreams_satisfied(graph: &Graph, state: &StateMap, name: &str) -> bool {
    graph
        .dependencies_of(name)
        .iter()
        .all(|dep| matches!(state.get(dep), Some(NodeState::Completed) | Some(NodeState::Cached)))
}

/// Tasks whose direct upstreams are all in `{Completed, Cached}` and which
/// are themselves still `Pending`, in lexicographic order — the
/// deterministic dispatch candidate list both serial and parallel executors
/// read from.
pub fn ready(state: &StateMap, graph: &Graph) -> Vec<TaskName> {
    let mut out: Vec<TaskName> = state
        .iter()
        .filter(|(name, s)| **s == NodeState::Pending && upstreams_satisfied(graph, state, name))
        .map(|(name, _)| name.clone())
        .collect();
    out.sort();
    out
}

/// Typed state-machine violation: an attempted transition whose observed
/// `from` state didn't match what the state map actually held.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition for '{name}': expected from={expected:?}, actual={actual:?}")]
pub struct TransitionError {
    pub name: TaskName,
    pub expected: NodeState,
    pub actual: NodeState,
}

/// Applies a single checked transition. Verifies the expected `from` state;
/// `Running` only leaves `Pending`, `Cached` only leaves `Pending`, and no
/// state ever leaves a terminal state (append-only).
pub fn transition(state: &mut StateMap, name: &str, from: NodeState, to: NodeState) -> Result<()> {
    let current = state
        .get(name)
        .copied()
        .ok_or_else(|| EngineError::System(format!("unknown node '{name}' in state map")))?;

    if current.is_terminal() {
        return Err(EngineError::System(format!(
            "cannot transition '{name}' out of terminal state {current:?}"
        )));
    }
    if current != from {
        return Err(EngineError::System(
            TransitionError {
                name: name.to_string(),
                expected: from,
                actual: current,
            }
            .to_string(),
        ));
    }

    match (from, to) {
        (NodeState::Pending, NodeState::Running) => {}
        (NodeState::Pending, NodeState::Cached) => {}
        (NodeState::Pending, NodeState::Skipped) => {}
        (NodeState::Running, NodeState::Completed) => {}
        (NodeState::Running, NodeState::Failed) => {}
        _ => {
            return Err(EngineError::System(format!(
                "illegal transition for '{name}': {from:?} -> {to:?}"
            )));
        }
    }

    state.insert(name.to_string(), to);
    Ok(())
}

pub fn is_terminal(state: &StateMap) -> bool {
    state.values().all(|s| s.is_terminal())
}

/// Marks `name` `Failed` (from whatever non-terminal state it is currently
/// in — `Running` in the ordinary executor path), then walks downstream
/// reachability in canonical index order, transitioning every still-
/// `Pending` descendant to `Skipped`. Returns the list of (name, cause)
/// pairs for newly-skipped nodes, in the order they were skipped.
///
/// Idempotent on already-terminal descendants: a descendant already
/// `Completed`/`Cached`/`Failed`/`Skipped` is left untouched.
pub fn fail_and_propagate(
    state: &mut StateMap,
    graph: &Graph,
    name: &str,
) -> Vec<(TaskName, TaskName)> {
    mark_failed(state, name);
    propagate_skips(state, graph, name)
}

/// Marks `name` `Failed` (from whatever non-terminal state it is currently
/// in) without propagating skips to descendants. Split out from
/// [`fail_and_propagate`] so the parallel executor can mark every failure
/// within a depth batch immediately, then defer skip propagation until the
/// whole batch has settled — see [`propagate_skips`].
pub fn mark_failed(state: &mut StateMap, name: &str) {
    if let Some(current) = state.get(name).copied() {
        if !current.is_terminal() {
            state.insert(name.to_string(), NodeState::Failed);
        }
    }
}

/// Restoration failure for a `ReuseCache` node (§4.7, §7): the node was
/// optimistically committed `Pending -> Cached` at dispatch time, but the
/// cache backend's `restore` call failed outside the lock. This is the one
/// documented exception to "no state leaves a terminal state" — a cache
/// contract violation (`has() == true` implied `restore()` would succeed)
/// is reported as a task failure so downstream propagation stays
/// deterministic, per §7's restoration-failure rule.
pub fn fail_cached_restore(
    state: &mut StateMap,
    graph: &Graph,
    name: &str,
) -> Vec<(TaskName, TaskName)> {
    mark_cached_restore_failed(state, name);
    propagate_skips(state, graph, name)
}

/// Demotes `name` from `Cached` to `Failed` without propagating skips. The
/// one documented exception to "no state leaves a terminal state" (§4.7),
/// split out for the same reason as [`mark_failed`].
pub fn mark_cached_restore_failed(state: &mut StateMap, name: &str) {
    if state.get(name).copied() == Some(NodeState::Cached) {
        state.insert(name.to_string(), NodeState::Failed);
    }
}

/// Walks downstream reachability from `name` in canonical index order,
/// transitioning every still-`Pending` descendant to `Skipped` with `name`
/// recorded as its cause. Idempotent on already-terminal descendants.
/// Exposed (not just used via [`fail_and_propagate`]) so the parallel
/// executor can call this once per failed sibling, in lexicographic order,
/// after an entire depth batch has settled — see
/// `exec::Shared::propagate_batch_failures`.
pub fn propagate_skips(state: &mut StateMap, graph: &Graph, name: &str) -> Vec<(TaskName, TaskName)> {
    let mut skipped = Vec::new();
    let mut queue: VecDeque<TaskName> = VecDeque::new();
    let mut seen: BTreeSet<TaskName> = BTreeSet::new();

    let mut first_level: Vec<&str> = graph.dependents_of(name).to_vec();
    first_level.sort_unstable();
    for d in first_level {
        queue.push_back(d.to_string());
    }

    while let Some(descendant) = queue.pop_front() {
        if !seen.insert(descendant.clone()) {
            continue;
        }
        if state.get(&descendant).copied() == Some(NodeState::Pending) {
            state.insert(descendant.clone(), NodeState::Skipped);
            skipped.push((descendant.clone(), name.to_string()));
        }
        let mut next: Vec<&str> = graph.dependents_of(&descendant).to_vec();
        next.sort_unstable();
        for n in next {
            queue.push_back(n.to_string());
        }
    }

    skipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Edge, Task};

    fn task(name: &str, upstream: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            task_type: None,
            command: "true".to_string(),
            inputs: Default::default(),
            env: Default::default(),
            outputs: Default::default(),
            upstream: upstream.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// A -> B -> C
    fn chain_graph() -> Graph {
        let tasks = BTreeMap::from([
            ("a".to_string(), task("a", &[])),
            ("b".to_string(), task("b", &["a"])),
            ("c".to_string(), task("c", &["b"])),
        ]);
        let edges = vec![
            Edge { from: "a".into(), to: "b".into() },
            Edge { from: "b".into(), to: "c".into() },
        ];
        Graph { tasks, edges }
    }

    /// A -> {B, C}
    fn fanout_graph() -> Graph {
        let tasks = BTreeMap::from([
            ("a".to_string(), task("a", &[])),
            ("b".to_string(), task("b", &["a"])),
            ("c".to_string(), task("c", &["a"])),
        ]);
        let edges = vec![
            Edge { from: "a".into(), to: "b".into() },
            Edge { from: "a".into(), to: "c".into() },
        ];
        Graph { tasks, edges }
    }

    #[test]
    fn initial_state_is_all_pending() {
        let graph = chain_graph();
        let state = initial_state_map(&graph);
        assert_eq!(state.len(), 3);
        assert!(state.values().all(|s| *s == NodeState::Pending));
    }

    #[test]
    fn ready_only_returns_nodes_with_satisfied_upstreams() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        assert_eq!(ready(&state, &graph), vec!["a".to_string()]);

        state.insert("a".to_string(), NodeState::Completed);
        assert_eq!(ready(&state, &graph), vec!["b".to_string()]);
    }

    #[test]
    fn ready_is_lexicographically_sorted() {
        let graph = fanout_graph();
        let mut state = initial_state_map(&graph);
        state.insert("a".to_string(), NodeState::Cached);
        assert_eq!(ready(&state, &graph), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn legal_transitions_succeed() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        transition(&mut state, "a", NodeState::Pending, NodeState::Running).unwrap();
        transition(&mut state, "a", NodeState::Running, NodeState::Completed).unwrap();
        assert_eq!(state["a"], NodeState::Completed);
    }

    #[test]
    fn transition_rejects_wrong_from_state() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        let err = transition(&mut state, "a", NodeState::Running, NodeState::Completed).unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
    }

    #[test]
    fn transition_rejects_illegal_target() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        let err = transition(&mut state, "a", NodeState::Pending, NodeState::Completed).unwrap_err();
        assert!(err.to_string().contains("illegal transition"));
    }

    #[test]
    fn transition_rejects_leaving_terminal_state() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        transition(&mut state, "a", NodeState::Pending, NodeState::Running).unwrap();
        transition(&mut state, "a", NodeState::Running, NodeState::Completed).unwrap();
        let err = transition(&mut state, "a", NodeState::Completed, NodeState::Failed).unwrap_err();
        assert!(err.to_string().contains("terminal"));
    }

    #[test]
    fn transition_rejects_unknown_node() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        let err = transition(&mut state, "zzz", NodeState::Pending, NodeState::Running).unwrap_err();
        assert!(err.to_string().contains("unknown node"));
    }

    #[test]
    fn fail_and_propagate_skips_pending_descendants() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        transition(&mut state, "a", NodeState::Pending, NodeState::Running).unwrap();
        let skipped = fail_and_propagate(&mut state, &graph, "a");
        assert_eq!(state["a"], NodeState::Failed);
        assert_eq!(state["b"], NodeState::Skipped);
        assert_eq!(state["c"], NodeState::Skipped);
        assert_eq!(
            skipped,
            vec![("b".to_string(), "a".to_string()), ("c".to_string(), "a".to_string())]
        );
    }

    #[test]
    fn fail_and_propagate_never_demotes_already_terminal_descendants() {
        let graph = fanout_graph();
        let mut state = initial_state_map(&graph);
        state.insert("b".to_string(), NodeState::Completed);
        transition(&mut state, "a", NodeState::Pending, NodeState::Running).unwrap();
        let skipped = fail_and_propagate(&mut state, &graph, "a");
        assert_eq!(state["b"], NodeState::Completed);
        assert_eq!(state["c"], NodeState::Skipped);
        assert_eq!(skipped, vec![("c".to_string(), "a".to_string())]);
    }

    #[test]
    fn fail_and_propagate_is_idempotent_on_terminal_source() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        transition(&mut state, "a", NodeState::Pending, NodeState::Running).unwrap();
        fail_and_propagate(&mut state, &graph, "a");
        let second = fail_and_propagate(&mut state, &graph, "a");
        assert!(second.is_empty());
        assert_eq!(state["a"], NodeState::Failed);
    }

    #[test]
    fn fail_cached_restore_demotes_cached_to_failed() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        transition(&mut state, "a", NodeState::Pending, NodeState::Cached).unwrap();
        let skipped = fail_cached_restore(&mut state, &graph, "a");
        assert_eq!(state["a"], NodeState::Failed);
        assert_eq!(state["b"], NodeState::Skipped);
        assert_eq!(skipped, vec![("b".to_string(), "a".to_string()), ("c".to_string(), "a".to_string())]);
    }

    #[test]
    fn is_terminal_reports_whole_map_completion() {
        let graph = chain_graph();
        let mut state = initial_state_map(&graph);
        assert!(!is_terminal(&state));
        for name in ["a", "b", "c"] {
            state.insert(name.to_string(), NodeState::Completed);
        }
        assert!(is_terminal(&state));
    }
}
