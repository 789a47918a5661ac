// src/plan.rs

//! Plan builder (§4.5): turns invalidation + cache presence into
//! Execute/ReuseCache decisions, and the plan hash.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cache::Cache;
use crate::graph::model::Graph;
use crate::invalidation::InvalidationMap;
use crate::snapshot::GraphSnapshot;
use crate::types::{HashHex, TaskName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    Execute,
    ReuseCache,
}

/// Ordered (topological, lex-tiebreak) list of task names plus the decision
/// for each. Every node has exactly one decision — there is no third "skip"
/// state; runtime-conditional skipping is prohibited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub order: Vec<TaskName>,
    pub decisions: BTreeMap<TaskName, Decision>,
}

impl Plan {
    pub fn decision(&self, name: &str) -> Option<Decision> {
        self.decisions.get(name).copied()
    }

    pub fn execute_count(&self) -> usize {
        self.decisions
            .values()
            .filter(|d| **d == Decision::Execute)
            .count()
    }

    pub fn reuse_count(&self) -> usize {
        self.decisions
            .values()
            .filter(|d| **d == Decision::ReuseCache)
            .count()
    }
}

#[derive(Serialize)]
struct CanonicalPlanEntry<'a> {
    name: &'a str,
    decision: Decision,
}

/// Plan hash: a stable hash over the ordered (name, decision) pairs,
/// length-prefixed via JSON array serialization (each entry is
/// self-delimiting, so no separate length prefix byte is needed on top of
/// JSON's own structural framing).
pub fn plan_hash(plan: &Plan) -> HashHex {
    let entries: Vec<CanonicalPlanEntry> = plan
        .order
        .iter()
        .map(|name| CanonicalPlanEntry {
            name,
            decision: plan.decisions[name],
        })
        .collect();
    let bytes = serde_json::to_vec(&entries).expect("canonical plan entries are always valid JSON");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    crate::hashutil::to_hex(hasher.finalize())
}

/// Builds a [`Plan`] from a graph, its snapshot, the invalidation map, and
/// cache presence. Nodes are processed in topological (lex-tiebreak) order
/// so that "any direct upstream decision != ReuseCache" can be read off
/// upstream decisions already computed in this same pass.
pub fn build_plan(
    graph: &Graph,
    snapshot: &GraphSnapshot,
    invalidation: &InvalidationMap,
    cache: &dyn Cache,
) -> Plan {
    let order = topo_order(graph);
    let mut decisions: BTreeMap<TaskName, Decision> = BTreeMap::new();

    for name in &order {
        let decision = decide(name, graph, snapshot, invalidation, cache, &decisions);
        decisions.insert(name.clone(), decision);
    }

    Plan { order, decisions }
}

fn decide(
    name: &str,
    _graph: &Graph,
    snapshot: &GraphSnapshot,
    invalidation: &InvalidationMap,
    cache: &dyn Cache,
    decided: &BTreeMap<TaskName, Decision>,
) -> Decision {
    let invalidated = invalidation.get(name).map(|e| e.invalidated).unwrap_or(true);
    if invalidated {
        return Decision::Execute;
    }

    let task_hash = match snapshot.get(name) {
        Some(node) => &node.task_hash,
        None => return Decision::Execute,
    };
    if !cache.has(task_hash) {
        return Decision::Execute;
    }

    let upstream = snapshot
        .get(name)
        .map(|n| n.upstream.clone())
        .unwrap_or_default();
    let all_upstream_reused = upstream
        .iter()
        .all(|u| decided.get(u).copied() == Some(Decision::ReuseCache));
    if !all_upstream_reused {
        return Decision::Execute;
    }

    Decision::ReuseCache
}

/// Deterministic topological order (lex tiebreak) over the graph's task
/// dependency edges.
fn topo_order(graph: &Graph) -> Vec<TaskName> {
    use std::collections::{BTreeSet, VecDeque};

    let mut indegree: BTreeMap<&str, usize> = graph.task_names().map(|n| (n, 0)).collect();
    for name in graph.task_names() {
        let count = graph.dependencies_of(name).len();
        indegree.insert(name, count);
    }

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
