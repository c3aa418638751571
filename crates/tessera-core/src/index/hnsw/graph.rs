//! HNSW Graph Structure
//!
//! Implements the hierarchical navigable small world graph as described in
//! the Malkov & Yashunin paper, laid out as an arena of nodes keyed by
//! internal id. Neighbor lists hold ids, never references, and each list
//! has its own lock.
//!
//! # Entry Point Rules
//!
//! - the first insert into an empty graph becomes the entry point
//! - an insert replaces it when its level is higher, or when the current one
//!   is no longer live
//! - deleting the entry point elects the highest-level live node (lowest id
//!   on a tie); that election is logged so replay reproduces it

use super::candidate::Candidate;
use super::node::GraphNode;
use super::params::HnswParams;
use crate::distance::DistanceMetric;
use crate::index::concurrency::NodeState;
use crate::storage::vector_store::NUM_SHARDS;
use crate::storage::{VectorRecord, VectorStore};
use crate::types::{EntryPoint, InternalId};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Node arena, vector store and entry point of one index.
#[derive(Debug)]
pub struct HnswGraph {
    metric: DistanceMetric,
    params: HnswParams,
    store: VectorStore,
    nodes: [RwLock<FxHashMap<InternalId, Arc<GraphNode>>>; NUM_SHARDS],
    node_count: AtomicUsize,
    entry: RwLock<Option<EntryPoint>>,
    election: Mutex<()>,
}

impl HnswGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(dimension: usize, metric: DistanceMetric, params: HnswParams) -> Self {
        Self {
            metric,
            params,
            store: VectorStore::new(dimension),
            nodes: std::array::from_fn(|_| RwLock::new(FxHashMap::default())),
            node_count: AtomicUsize::new(0),
            entry: RwLock::new(None),
            election: Mutex::new(()),
        }
    }

    #[inline]
    const fn shard_index(id: InternalId) -> usize {
        (id % NUM_SHARDS as u64) as usize
    }

    /// Distance metric.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Construction parameters.
    #[must_use]
    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Backing vector store.
    #[must_use]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: InternalId) -> Option<Arc<GraphNode>> {
        self.nodes[Self::shard_index(id)].read().get(&id).cloned()
    }

    /// Adds a node to the arena. Returns false if the id is taken.
    pub(crate) fn publish(&self, node: Arc<GraphNode>) -> bool {
        let id = node.id();
        let mut shard = self.nodes[Self::shard_index(id)].write();
        if shard.contains_key(&id) {
            return false;
        }
        shard.insert(id, node);
        self.node_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Removes a node from the arena.
    pub(crate) fn unpublish(&self, id: InternalId) -> Option<Arc<GraphNode>> {
        let node = self.nodes[Self::shard_index(id)].write().remove(&id)?;
        self.node_count.fetch_sub(1, Ordering::Relaxed);
        Some(node)
    }

    /// Number of nodes, tombstoned included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.node_count.load(Ordering::Relaxed)
    }

    /// True if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every node, ascending by id.
    #[must_use]
    pub fn nodes_sorted(&self) -> Vec<Arc<GraphNode>> {
        let mut all: Vec<Arc<GraphNode>> = self
            .nodes
            .iter()
            .flat_map(|shard| shard.read().values().cloned().collect::<Vec<_>>())
            .collect();
        all.sort_unstable_by_key(|n| n.id());
        all
    }

    /// Highest level any node reaches.
    #[must_use]
    pub fn max_level(&self) -> u8 {
        self.nodes
            .iter()
            .filter_map(|shard| shard.read().values().map(|n| n.level()).max())
            .max()
            .unwrap_or(0)
    }

    /// True if the node exists and is live.
    #[must_use]
    pub fn is_live(&self, id: InternalId) -> bool {
        self.node(id)
            .is_some_and(|n| n.state().is_visible_in_results())
    }

    /// Distance from `query` to a stored node, with its record.
    #[must_use]
    pub fn distance_to(&self, query: &[f32], id: InternalId) -> Option<(f32, Arc<VectorRecord>)> {
        let record = self.store.get(id)?;
        Some((self.metric.distance(query, record.vector()), record))
    }

    // =========================================================================
    // Entry point
    // =========================================================================

    /// Current entry point.
    #[must_use]
    pub fn entry_point(&self) -> Option<EntryPoint> {
        *self.entry.read()
    }

    /// Makes `candidate` the entry point if the graph has none.
    pub(crate) fn init_entry_if_empty(&self, candidate: EntryPoint) -> bool {
        let mut entry = self.entry.write();
        if entry.is_none() {
            *entry = Some(candidate);
            true
        } else {
            false
        }
    }

    /// Offers a live node as entry point.
    ///
    /// Taken if there is no entry point, if the current one is not live, or
    /// if `candidate` sits on a higher level.
    pub(crate) fn offer_entry(&self, candidate: EntryPoint) {
        if !self.is_live(candidate.id) {
            return;
        }
        let mut entry = self.entry.write();
        let replace = match *entry {
            None => true,
            Some(current) => candidate.level > current.level || !self.is_live(current.id),
        };
        if replace {
            *entry = Some(candidate);
        }
    }

    /// Applies an elected entry point (live path and replay).
    ///
    /// A dead candidate is ignored. `None` only clears an entry point that
    /// is no longer live, so a racing insert's promotion is never undone.
    pub(crate) fn apply_entry(&self, candidate: Option<EntryPoint>) {
        match candidate {
            Some(candidate) => self.offer_entry(candidate),
            None => {
                let mut entry = self.entry.write();
                if entry.is_some_and(|current| !self.is_live(current.id)) {
                    *entry = None;
                }
            }
        }
    }

    /// Overwrites the entry point (snapshot restore).
    pub(crate) fn restore_entry(&self, entry: Option<EntryPoint>) {
        *self.entry.write() = entry;
    }

    /// Picks the highest-level live node, lowest id on a tie.
    #[must_use]
    pub fn elect_entry(&self) -> Option<EntryPoint> {
        let mut best: Option<EntryPoint> = None;
        for shard in &self.nodes {
            for node in shard.read().values() {
                if node.state() != NodeState::Live {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some(b) => {
                        node.level() > b.level || (node.level() == b.level && node.id() < b.id)
                    }
                };
                if better {
                    best = Some(EntryPoint {
                        id: node.id(),
                        level: node.level(),
                    });
                }
            }
        }
        best
    }

    /// Serializes entry point re-elections.
    pub(crate) fn election_lock(&self) -> MutexGuard<'_, ()> {
        self.election.lock()
    }

    /// Distance-sorted candidates with their records, skipping vanished ids.
    pub(crate) fn score(
        &self,
        base: &[f32],
        ids: impl IntoIterator<Item = InternalId>,
    ) -> Vec<(Candidate, Arc<VectorRecord>)> {
        let mut pool: Vec<(Candidate, Arc<VectorRecord>)> = ids
            .into_iter()
            .filter_map(|id| {
                let (distance, record) = self.distance_to(base, id)?;
                Some((Candidate::new(id, distance), record))
            })
            .collect();
        pool.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        pool
    }
}
