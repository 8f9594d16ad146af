//! Hierarchy index - immutable adjacency snapshot of the entity forest/DAG.
//!
//! A `HierarchySnapshot` is built once from a flat edge list and never
//! mutated afterwards. Every entity gets a dense `NodeIdx` (assigned in
//! `EntityReference` order) so that per-call accumulators can be plain
//! index-keyed maps.
//!
//! `HierarchyIndex` is the long-lived shared handle: readers take an
//! `Arc<HierarchySnapshot>` and keep it for the whole computation, while a
//! refresh builds a new snapshot off to the side and swaps it in atomically.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info};

use crate::error::{Result, StatsError};
use crate::types::{EntityReference, HierarchyEdge};

/// Dense internal node id, valid only for the snapshot that issued it.
pub type NodeIdx = u32;

#[derive(Debug)]
pub struct HierarchySnapshot {
    generation: u64,
    refs: Vec<EntityReference>,
    lookup: HashMap<EntityReference, NodeIdx>,
    children: Vec<Vec<NodeIdx>>,
    parents: Vec<Vec<NodeIdx>>,
    /// Position in a parents-before-children order.
    topo_rank: Vec<u32>,
    is_forest: bool,
}

impl HierarchySnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            refs: Vec::new(),
            lookup: HashMap::new(),
            children: Vec::new(),
            parents: Vec::new(),
            topo_rank: Vec::new(),
            is_forest: true,
        }
    }

    /// Build a snapshot from `(parent, child)` edges.
    ///
    /// Duplicate edges are collapsed. Self-edges and cycles are rejected with
    /// `StatsError::Cycle`.
    pub fn build<I>(edges: I, generation: u64) -> Result<Self>
    where
        I: IntoIterator<Item = HierarchyEdge>,
    {
        let edges: BTreeSet<(EntityReference, EntityReference)> = edges
            .into_iter()
            .map(|e| (e.parent, e.child))
            .collect();

        if let Some((parent, _)) = edges.iter().find(|(p, c)| p == c) {
            return Err(StatsError::Cycle(*parent));
        }

        let nodes: BTreeSet<EntityReference> = edges
            .iter()
            .flat_map(|(p, c)| [*p, *c])
            .collect();
        let refs: Vec<EntityReference> = nodes.into_iter().collect();
        let lookup: HashMap<EntityReference, NodeIdx> = refs
            .iter()
            .enumerate()
            .map(|(i, r)| (*r, i as NodeIdx))
            .collect();

        let mut children: Vec<Vec<NodeIdx>> = vec![Vec::new(); refs.len()];
        let mut parents: Vec<Vec<NodeIdx>> = vec![Vec::new(); refs.len()];
        // BTreeSet iteration keeps both adjacency lists sorted by reference.
        for (p, c) in &edges {
            let pi = lookup[p];
            let ci = lookup[c];
            children[pi as usize].push(ci);
            parents[ci as usize].push(pi);
        }

        let topo_rank = topological_ranks(&refs, &children, &parents)?;
        let is_forest = parents.iter().all(|p| p.len() <= 1);

        debug!(
            generation,
            nodes = refs.len(),
            edges = edges.len(),
            is_forest,
            "built hierarchy snapshot"
        );

        Ok(Self {
            generation,
            refs,
            lookup,
            children,
            parents,
            topo_rank,
            is_forest,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// True when no node has more than one parent.
    pub fn is_forest(&self) -> bool {
        self.is_forest
    }

    pub fn contains(&self, entity: &EntityReference) -> bool {
        self.lookup.contains_key(entity)
    }

    pub fn index_of(&self, entity: &EntityReference) -> Option<NodeIdx> {
        self.lookup.get(entity).copied()
    }

    pub fn reference(&self, idx: NodeIdx) -> EntityReference {
        self.refs[idx as usize]
    }

    pub fn topo_rank(&self, idx: NodeIdx) -> u32 {
        self.topo_rank[idx as usize]
    }

    pub fn child_indices(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.children[idx as usize]
    }

    pub fn parent_indices(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.parents[idx as usize]
    }

    fn require(&self, entity: &EntityReference) -> Result<NodeIdx> {
        self.index_of(entity)
            .ok_or(StatsError::UnknownEntity(*entity))
    }

    /// Direct children, sorted.
    pub fn children(&self, entity: &EntityReference) -> Result<Vec<EntityReference>> {
        let idx = self.require(entity)?;
        Ok(self.resolve(self.child_indices(idx)))
    }

    /// The (first) parent. In a DAG use [`Self::parents`] for all of them.
    pub fn parent(&self, entity: &EntityReference) -> Result<Option<EntityReference>> {
        let idx = self.require(entity)?;
        Ok(self.parent_indices(idx).first().map(|p| self.reference(*p)))
    }

    pub fn parents(&self, entity: &EntityReference) -> Result<Vec<EntityReference>> {
        let idx = self.require(entity)?;
        Ok(self.resolve(self.parent_indices(idx)))
    }

    /// Transitive closure below `entity`, excluding itself, sorted.
    pub fn descendants(&self, entity: &EntityReference) -> Result<Vec<EntityReference>> {
        let idx = self.require(entity)?;
        let mut found = self.descendant_indices(idx);
        found.sort_unstable();
        Ok(self.resolve(&found))
    }

    /// Ancestors ordered node-to-root (nearest first), each listed once.
    pub fn ancestors(&self, entity: &EntityReference) -> Result<Vec<EntityReference>> {
        let idx = self.require(entity)?;
        Ok(self.resolve(&self.ancestor_indices(idx)))
    }

    pub fn roots(&self) -> Vec<EntityReference> {
        (0..self.refs.len() as NodeIdx)
            .filter(|i| self.parent_indices(*i).is_empty())
            .map(|i| self.reference(i))
            .collect()
    }

    /// Breadth-first walk downwards; each node visited once.
    pub fn descendant_indices(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        self.walk(idx, |i| self.child_indices(i))
    }

    /// Breadth-first walk upwards; each node visited once, nearest first.
    pub fn ancestor_indices(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        self.walk(idx, |i| self.parent_indices(i))
    }

    fn walk<'a, F>(&'a self, start: NodeIdx, next: F) -> Vec<NodeIdx>
    where
        F: Fn(NodeIdx) -> &'a [NodeIdx],
    {
        let mut seen = vec![false; self.refs.len()];
        seen[start as usize] = true;
        let mut out = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &n in next(current) {
                if !seen[n as usize] {
                    seen[n as usize] = true;
                    out.push(n);
                    queue.push_back(n);
                }
            }
        }
        out
    }

    fn resolve(&self, indices: &[NodeIdx]) -> Vec<EntityReference> {
        indices.iter().map(|i| self.reference(*i)).collect()
    }
}

/// Kahn's algorithm. Any node left with unresolved parents sits on a cycle.
fn topological_ranks(
    refs: &[EntityReference],
    children: &[Vec<NodeIdx>],
    parents: &[Vec<NodeIdx>],
) -> Result<Vec<u32>> {
    let mut pending: Vec<usize> = parents.iter().map(|p| p.len()).collect();
    let mut queue: VecDeque<NodeIdx> = (0..refs.len() as NodeIdx)
        .filter(|i| pending[*i as usize] == 0)
        .collect();
    let mut rank = vec![u32::MAX; refs.len()];
    let mut next_rank = 0u32;

    while let Some(idx) = queue.pop_front() {
        rank[idx as usize] = next_rank;
        next_rank += 1;
        for &c in &children[idx as usize] {
            pending[c as usize] -= 1;
            if pending[c as usize] == 0 {
                queue.push_back(c);
            }
        }
    }

    if let Some(stuck) = pending.iter().position(|p| *p > 0) {
        return Err(StatsError::Cycle(refs[stuck]));
    }
    Ok(rank)
}

// ── Shared handle ─────────────────────────────────────────────

/// Long-lived, lock-free holder of the current hierarchy snapshot.
pub struct HierarchyIndex {
    current: ArcSwap<HierarchySnapshot>,
}

impl HierarchyIndex {
    pub fn new(snapshot: HierarchySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn empty() -> Self {
        Self::new(HierarchySnapshot::empty())
    }

    pub fn from_edges<I>(edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = HierarchyEdge>,
    {
        Ok(Self::new(HierarchySnapshot::build(edges, 1)?))
    }

    /// The snapshot in force right now. Hold it for the whole computation.
    pub fn snapshot(&self) -> Arc<HierarchySnapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    /// Build a replacement snapshot and swap it in. On error the current
    /// snapshot stays in place. Returns the new generation.
    ///
    /// The swap only lands if no other refresh published in between;
    /// otherwise the snapshot is rebuilt on top of the newer generation.
    pub fn refresh<I>(&self, edges: I) -> Result<u64>
    where
        I: IntoIterator<Item = HierarchyEdge>,
    {
        let edges: Vec<HierarchyEdge> = edges.into_iter().collect();
        loop {
            let current = self.current.load_full();
            let generation = current.generation() + 1;
            let snapshot = Arc::new(HierarchySnapshot::build(edges.iter().copied(), generation)?);
            let nodes = snapshot.len();
            let previous = self.current.compare_and_swap(&current, snapshot);
            if Arc::ptr_eq(&previous, &current) {
                info!(generation, nodes, "hierarchy snapshot swapped");
                return Ok(generation);
            }
            debug!(generation, "concurrent hierarchy refresh, rebuilding");
        }
    }
}

impl Default for HierarchyIndex {
    fn default() -> Self {
        Self::empty()
    }
}
