//! Rollup engine - aggregates raw statistic values up the entity hierarchy.
//!
//! For `COUNT_DISTINCT_VALUES` each node's tally is the multiset union of its
//! own value and the tallies of its in-scope children. Nodes are processed
//! children-first (reverse topological rank), with accumulators keyed by
//! `NodeIdx`, so every child result is computed once and reused by each
//! ancestor level in the same call.
//!
//! A multi-parent (DAG) snapshot would double count through diamonds under
//! that scheme, so DAG snapshots fall back to a de-duplicated closure walk
//! per node.
//!
//! Only nodes in the resolved scope participate: a node's tally covers
//! itself and the in-scope members reachable below it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::assemble::{assemble, to_tally_pack};
use crate::hierarchy::{HierarchySnapshot, NodeIdx};
use crate::selection::ResolvedScope;
use crate::types::{EntityReference, RollupKind, StatisticValue, TallyPack};

pub const DEFAULT_MISSING_LABEL: &str = "(none)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupSettings {
    /// Count members without a recorded value under `missing_label`.
    pub count_missing: bool,
    pub missing_label: String,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            count_missing: false,
            missing_label: DEFAULT_MISSING_LABEL.to_string(),
        }
    }
}

/// Value → count accumulator for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTally {
    counts: BTreeMap<String, u64>,
    last_updated: Option<DateTime<Utc>>,
}

impl NodeTally {
    pub fn add(&mut self, value: &str, count: u64) {
        *self.counts.entry(value.to_string()).or_insert(0) += count;
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated = Some(self.last_updated.map_or(at, |cur| cur.max(at)));
    }

    /// Multiset union.
    pub fn merge(&mut self, other: &NodeTally) {
        for (value, count) in &other.counts {
            self.add(value, *count);
        }
        if let Some(at) = other.last_updated {
            self.touch(at);
        }
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub struct RollupEngine {
    settings: RollupSettings,
}

impl RollupEngine {
    pub fn new(settings: RollupSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RollupSettings {
        &self.settings
    }

    /// One tally pack per node of `scope`, sorted by entity.
    pub fn roll_up(
        &self,
        snapshot: &HierarchySnapshot,
        scope: &ResolvedScope,
        values: &[StatisticValue],
        kind: RollupKind,
    ) -> Vec<TallyPack<String>> {
        let per_node = match kind {
            RollupKind::None => return Vec::new(),
            RollupKind::Exact => self.own_tallies(scope, values),
            RollupKind::CountDistinctValues => {
                let own = self.own_tallies(scope, values);
                if snapshot.is_forest() {
                    bottom_up(snapshot, scope, own)
                } else {
                    closure_per_node(snapshot, scope, own)
                }
            }
        };
        debug!(
            %kind,
            nodes = scope.nodes.len(),
            tallied = per_node.len(),
            "rolled up statistic values"
        );
        assemble(&scope.nodes, &per_node)
    }

    /// A single pack for the whole selection, labelled with `subject`.
    ///
    /// `COUNT_DISTINCT_VALUES` counts every member once; `EXACT` reports the
    /// scope entity's own values; `NONE` yields an empty pack.
    pub fn roll_up_selection(
        &self,
        subject: EntityReference,
        scope: &ResolvedScope,
        values: &[StatisticValue],
        kind: RollupKind,
    ) -> TallyPack<String> {
        let own = match kind {
            RollupKind::None => return to_tally_pack(subject, None),
            _ => self.own_tallies(scope, values),
        };
        match kind {
            RollupKind::Exact => to_tally_pack(subject, own.get(&scope.scope)),
            _ => {
                let mut total = NodeTally::default();
                for member in &scope.members {
                    if let Some(tally) = own.get(member) {
                        total.merge(tally);
                    }
                }
                to_tally_pack(subject, Some(&total))
            }
        }
    }

    /// Each member's own contribution: one count per distinct current value.
    fn own_tallies(
        &self,
        scope: &ResolvedScope,
        values: &[StatisticValue],
    ) -> HashMap<EntityReference, NodeTally> {
        let mut recorded: HashMap<EntityReference, BTreeMap<Option<&str>, DateTime<Utc>>> =
            HashMap::new();
        for v in values {
            if !v.current || !scope.is_member(&v.entity) {
                continue;
            }
            let seen = recorded.entry(v.entity).or_default();
            let at = seen.entry(v.value.as_deref()).or_insert(v.created_at);
            *at = (*at).max(v.created_at);
        }

        let mut own: HashMap<EntityReference, NodeTally> = HashMap::new();
        for (entity, by_value) in recorded {
            let mut tally = NodeTally::default();
            for (value, at) in &by_value {
                if let Some(value) = value {
                    tally.add(value, 1);
                    tally.touch(*at);
                }
            }
            if tally.is_empty() && self.settings.count_missing {
                tally.add(&self.settings.missing_label, 1);
                if let Some(at) = by_value.values().max() {
                    tally.touch(*at);
                }
            }
            if !tally.is_empty() {
                own.insert(entity, tally);
            }
        }

        if self.settings.count_missing {
            for member in &scope.members {
                own.entry(*member).or_insert_with(|| {
                    let mut tally = NodeTally::default();
                    tally.add(&self.settings.missing_label, 1);
                    tally
                });
            }
        }
        own
    }
}

impl Default for RollupEngine {
    fn default() -> Self {
        Self::new(RollupSettings::default())
    }
}

/// Children-first accumulation over a forest.
fn bottom_up(
    snapshot: &HierarchySnapshot,
    scope: &ResolvedScope,
    mut own: HashMap<EntityReference, NodeTally>,
) -> HashMap<EntityReference, NodeTally> {
    let mut order: Vec<NodeIdx> = scope
        .nodes
        .iter()
        .filter_map(|r| snapshot.index_of(r))
        .collect();
    order.sort_unstable_by_key(|idx| Reverse(snapshot.topo_rank(*idx)));

    let mut acc: HashMap<NodeIdx, NodeTally> = HashMap::with_capacity(order.len());
    for idx in order {
        let mut tally = own
            .remove(&snapshot.reference(idx))
            .unwrap_or_default();
        for child in snapshot.child_indices(idx) {
            if let Some(child_tally) = acc.get(child) {
                tally.merge(child_tally);
            }
        }
        acc.insert(idx, tally);
    }

    // Whatever is left in `own` belongs to entities outside the snapshot.
    let mut per_node = own;
    per_node.extend(
        acc.into_iter()
            .map(|(idx, tally)| (snapshot.reference(idx), tally)),
    );
    per_node
}

/// Per-node walk over the in-scope sub-DAG, counting each member once.
fn closure_per_node(
    snapshot: &HierarchySnapshot,
    scope: &ResolvedScope,
    own: HashMap<EntityReference, NodeTally>,
) -> HashMap<EntityReference, NodeTally> {
    let in_scope: HashSet<NodeIdx> = scope
        .nodes
        .iter()
        .filter_map(|r| snapshot.index_of(r))
        .collect();

    let mut per_node = HashMap::with_capacity(scope.nodes.len());
    for node in &scope.nodes {
        let Some(start) = snapshot.index_of(node) else {
            if let Some(tally) = own.get(node) {
                per_node.insert(*node, tally.clone());
            }
            continue;
        };

        let mut tally = NodeTally::default();
        let mut seen: HashSet<NodeIdx> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            if let Some(own_tally) = own.get(&snapshot.reference(idx)) {
                tally.merge(own_tally);
            }
            for &child in snapshot.child_indices(idx) {
                if in_scope.contains(&child) && seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        per_node.insert(*node, tally);
    }
    per_node
}
