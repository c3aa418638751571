//! Graph nodes and their per-level adjacency.

use crate::index::concurrency::{AtomicNodeState, NodeState};
use crate::types::InternalId;
use parking_lot::RwLock;

/// Adjacency of one node at one level.
///
/// `version` increases on every write so an insert can compute a prune
/// without holding the lock and detect a concurrent edit before committing.
#[derive(Debug, Default, Clone)]
pub struct NeighborList {
    /// Neighbor ids.
    pub ids: Vec<InternalId>,
    /// Write counter.
    pub version: u64,
}

impl NeighborList {
    /// Replaces the ids and bumps the version.
    pub fn replace(&mut self, ids: Vec<InternalId>) {
        self.ids = ids;
        self.version += 1;
    }
}

/// A node in the HNSW graph.
#[derive(Debug)]
pub struct GraphNode {
    id: InternalId,
    level: u8,
    state: AtomicNodeState,
    layers: Box<[RwLock<NeighborList>]>,
}

impl GraphNode {
    /// Creates a live node with empty lists on levels `0..=level`.
    #[must_use]
    pub fn new(id: InternalId, level: u8) -> Self {
        Self::with_state(id, level, NodeState::Live)
    }

    pub(crate) fn with_state(id: InternalId, level: u8, state: NodeState) -> Self {
        Self {
            id,
            level,
            state: AtomicNodeState::new(state),
            layers: (0..=level)
                .map(|_| RwLock::new(NeighborList::default()))
                .collect(),
        }
    }

    /// Node id.
    #[must_use]
    pub fn id(&self) -> InternalId {
        self.id
    }

    /// Highest level this node lives on.
    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state.load()
    }

    /// CAS transition, see [`AtomicNodeState::transition`].
    pub fn transition(&self, from: NodeState, to: NodeState) -> bool {
        self.state.transition(from, to)
    }

    /// The lock guarding the list at `level`, if the node reaches that level.
    pub(crate) fn layer(&self, level: usize) -> Option<&RwLock<NeighborList>> {
        self.layers.get(level)
    }

    /// Copy of the neighbor ids at `level`.
    #[must_use]
    pub fn neighbors(&self, level: usize) -> Vec<InternalId> {
        self.layer(level)
            .map(|l| l.read().ids.clone())
            .unwrap_or_default()
    }

    /// Appends the neighbor ids at `level` to `out`, holding the read lock
    /// only for the copy.
    pub fn copy_neighbors_into(&self, level: usize, out: &mut Vec<InternalId>) {
        out.clear();
        if let Some(layer) = self.layer(level) {
            out.extend_from_slice(&layer.read().ids);
        }
    }

    /// Replaces the neighbor ids at `level`.
    pub fn set_neighbors(&self, level: usize, ids: Vec<InternalId>) {
        if let Some(layer) = self.layer(level) {
            layer.write().replace(ids);
        }
    }

    /// Empties every level.
    pub fn clear_neighbors(&self) {
        for layer in self.layers.iter() {
            layer.write().replace(Vec::new());
        }
    }
}
