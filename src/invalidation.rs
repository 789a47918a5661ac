// src/invalidation.rs

//! Invalidation analyzer (§4.4): a pure function comparing two graph
//! snapshots and emitting a per-node reason set, with strict transitive
//! dependency propagation. Never touches the filesystem or cache — it is
//! pure over its two [`GraphSnapshot`] inputs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::snapshot::{GraphSnapshot, NodeSnapshot};
use crate::types::TaskName;

/// Closed set of invalidation reasons (§3), ordered by priority for
/// canonical serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReasonType {
    InputChanged,
    EnvChanged,
    DependencyInvalidated,
    GraphStructureChanged,
    CommandChanged,
    OutputChanged,
}

/// One reason entry: type, optional source task (required for
/// `DependencyInvalidated`), and an ordered, deduped detail list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReason {
    #[serde(rename = "type")]
    pub reason_type: ReasonType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TaskName>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<(String, String)>,
}

impl InvalidationReason {
    fn sort_key(&self) -> (u8, &str, &[(String, String)]) {
        (
            self.reason_type as u8,
            self.source.as_deref().unwrap_or(""),
            self.details.as_slice(),
        )
    }
}

impl PartialOrd for InvalidationReason {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InvalidationReason {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Per-node invalidation entry. The reason list is always canonicalized
/// (sorted, deduped) by the time this is handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationEntry {
    pub invalidated: bool,
    pub reasons: Vec<InvalidationReason>,
}

/// Map of task name to its invalidation entry — always contains exactly one
/// entry per node of the *new* snapshot. A `BTreeMap` gives sorted-key
/// serialization for free.
pub type InvalidationMap = BTreeMap<TaskName, InvalidationEntry>;

/// Compares `old` (absent on a from-scratch run) against `new`, returning
/// the canonical invalidation map.
pub fn analyze(old: Option<&GraphSnapshot>, new: &GraphSnapshot) -> InvalidationMap {
    let empty = GraphSnapshot::new();
    let old = old.unwrap_or(&empty);

    let mut direct: BTreeMap<TaskName, Vec<InvalidationReason>> = BTreeMap::new();
    for (name, node) in new {
        direct.insert(name.clone(), direct_reasons(old.get(name), node, new));
    }

    let order = topo_order(new);

    let mut root_set: BTreeMap<TaskName, BTreeSet<TaskName>> = BTreeMap::new();
    let mut final_reasons: BTreeMap<TaskName, Vec<InvalidationReason>> = BTreeMap::new();

    for name in &order {
        let my_direct = direct.get(name).cloned().unwrap_or_default();
        let is_own_invalidated = !my_direct.is_empty();

        let mut roots: BTreeSet<TaskName> = BTreeSet::new();
        if is_own_invalidated {
            roots.insert(name.clone());
        }

        let mut dep_sources: BTreeSet<TaskName> = BTreeSet::new();
        if let Some(node) = new.get(name) {
            for upstream in &node.upstream {
                // Gate on the upstream's *overall* (post-propagation) root
                // set, not just whether it had direct reasons of its own —
                // otherwise propagation stops after exactly one hop, since a
                // purely dependency-invalidated node has no direct reasons.
                if let Some(upstream_roots) = root_set.get(upstream) {
                    if !upstream_roots.is_empty() {
                        roots.extend(upstream_roots.iter().cloned());
                        dep_sources.extend(upstream_roots.iter().cloned());
                    }
                }
            }
        }

        let mut reasons = my_direct;
        for source in &dep_sources {
            reasons.push(InvalidationReason {
                reason_type: ReasonType::DependencyInvalidated,
                source: Some(source.clone()),
                details: Vec::new(),
            });
        }
        reasons.sort();
        reasons.dedup();

        root_set.insert(name.clone(), roots);
        final_reasons.insert(name.clone(), reasons);
    }

    let mut map = InvalidationMap::new();
    for name in new.keys() {
        let reasons = final_reasons.remove(name).unwrap_or_default();
        let invalidated = !reasons.is_empty();
        map.insert(name.clone(), InvalidationEntry { invalidated, reasons });
    }
    map
}

/// Direct (non-propagated) reasons for a single node, per §4.4's rule list.
fn direct_reasons(
    old: Option<&NodeSnapshot>,
    new: &NodeSnapshot,
    new_graph: &GraphSnapshot,
) -> Vec<InvalidationReason> {
    let Some(old) = old else {
        return vec![InvalidationReason {
            reason_type: ReasonType::GraphStructureChanged,
            source: None,
            details: Vec::new(),
        }];
    };

    let mut reasons: Vec<InvalidationReason> = Vec::new();
    let mut structure_details: Vec<(String, String)> = Vec::new();

    if old.input_hash != new.input_hash {
        reasons.push(InvalidationReason {
            reason_type: ReasonType::InputChanged,
            source: None,
            details: Vec::new(),
        });
    }

    for name in symmetric_difference(&old.inputs, &new.inputs) {
        structure_details.push(("InputName".to_string(), name));
    }

    let env_changes = env_diff(&old.env, &new.env);
    if !env_changes.is_empty() {
        reasons.push(InvalidationReason {
            reason_type: ReasonType::EnvChanged,
            source: None,
            details: env_changes,
        });
    }

    if old.command != new.command {
        reasons.push(InvalidationReason {
            reason_type: ReasonType::CommandChanged,
            source: None,
            details: Vec::new(),
        });
    }

    let output_changes: Vec<(String, String)> = symmetric_difference(&old.outputs, &new.outputs)
        .into_iter()
        .map(|name| ("OutputName".to_string(), name))
        .collect();
    if !output_changes.is_empty() {
        reasons.push(InvalidationReason {
            reason_type: ReasonType::OutputChanged,
            source: None,
            details: output_changes,
        });
    }

    if old.upstream != new.upstream {
        structure_details.push(("Upstream".to_string(), "changed".to_string()));
    }

    for upstream in &old.upstream {
        if !new_graph.contains_key(upstream) {
            structure_details.push(("UpstreamTaskID".to_string(), upstream.clone()));
        }
    }

    if !structure_details.is_empty() {
        structure_details.sort();
        structure_details.dedup();
        reasons.push(InvalidationReason {
            reason_type: ReasonType::GraphStructureChanged,
            source: None,
            details: structure_details,
        });
    }

    reasons
}

fn symmetric_difference(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Vec<String> {
    let mut out: BTreeSet<String> = a.difference(b).cloned().collect();
    out.extend(b.difference(a).cloned());
    out.into_iter().collect()
}

fn env_diff(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut keys: BTreeSet<&String> = old.keys().collect();
    keys.extend(new.keys());

    let mut out = Vec::new();
    for key in keys {
        match (old.get(key), new.get(key)) {
            (Some(a), Some(b)) if a != b => out.push(("EnvName".to_string(), key.clone())),
            (Some(_), None) => out.push(("EnvName".to_string(), key.clone())),
            (None, Some(_)) => out.push(("EnvName".to_string(), key.clone())),
            _ => {}
        }
    }
    out
}

/// Deterministic topological order (lex tiebreak) over the new snapshot's
/// dependency structure, used so upstream nodes are always processed before
/// their dependents during propagation.
fn topo_order(snapshot: &GraphSnapshot) -> Vec<TaskName> {
    let mut indegree: BTreeMap<&TaskName, usize> = snapshot.keys().map(|k| (k, 0)).collect();
    let mut dependents: BTreeMap<&TaskName, Vec<&TaskName>> = BTreeMap::new();

    for (name, node) in snapshot {
        for upstream in &node.upstream {
            if let Some(entry) = indegree.get_mut(name) {
                if snapshot.contains_key(upstream) {
                    *entry += 1;
                }
            }
            dependents.entry(upstream).or_default().push(name);
        }
    }

    let mut ready: VecDeque<&TaskName> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(k, _)| *k)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut order = Vec::with_capacity(snapshot.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.clone());
        if let Some(deps) = dependents.get(name) {
            let mut newly_ready = Vec::new();
            for dep in deps {
                if let Some(entry) = indegree.get_mut(dep) {
                    *entry -= 1;
                    if *entry == 0 {
                        newly_ready.push(*dep);
                    }
                }
            }
            newly_ready.sort();
            for n in newly_ready {
                ready.push_back(n);
            }
        }
        ready = ready.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    }

    order
}
