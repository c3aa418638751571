//! Concurrency control: node lifecycle, the structure gate and reader epochs.
//!
//! # Node Lifecycle
//!
//! ```text
//! Live ──delete──▶ Tombstoned ──compaction──▶ Compacting ──▶ Freed
//! ```
//!
//! Transitions only move forward and are applied with compare-and-swap, so
//! two racing deletes or two compaction cycles cannot both claim a node.
//! Searches observe `Live` and `Tombstoned` nodes only: `Compacting` and
//! `Freed` exist while the compactor holds the gate exclusively.
//!
//! # Lock Ordering
//!
//! `gate` → `entry election` → `node neighbor list` → `store shard`.
//! Searches never take the gate and hold at most one lock at a time.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum NodeState {
    /// Searchable and linkable.
    Live = 0,
    /// Deleted: traversed as a pass-through, never returned.
    Tombstoned = 1,
    /// Being unlinked by compaction.
    Compacting = 2,
    /// Unlinked; the id awaits reuse.
    Freed = 3,
}

impl NodeState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Live,
            1 => Self::Tombstoned,
            2 => Self::Compacting,
            _ => Self::Freed,
        }
    }

    /// Only live nodes may appear in search results.
    #[must_use]
    pub const fn is_visible_in_results(self) -> bool {
        matches!(self, Self::Live)
    }

    /// Searches may walk through live and tombstoned nodes.
    #[must_use]
    pub const fn is_traversable(self) -> bool {
        matches!(self, Self::Live | Self::Tombstoned)
    }
}

/// [`NodeState`] stored in an `AtomicU8`.
#[derive(Debug)]
pub struct AtomicNodeState(AtomicU8);

impl AtomicNodeState {
    /// Creates a state cell.
    #[must_use]
    pub const fn new(state: NodeState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state.
    #[must_use]
    pub fn load(&self) -> NodeState {
        NodeState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from → to` if the node is currently in `from`.
    ///
    /// Returns false if another thread got there first or if the transition
    /// would go backwards.
    pub fn transition(&self, from: NodeState, to: NodeState) -> bool {
        if to <= from {
            return false;
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Coarse gate separating per-node mutations from whole-graph operations.
///
/// Inserts and deletes enter shared; compaction's unlink section and snapshot
/// capture enter exclusive. Searches never touch it.
#[derive(Debug, Default)]
pub struct StructureGate {
    lock: RwLock<()>,
}

impl StructureGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters for a single-node mutation.
    pub fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    /// Enters alone.
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

/// Epoch counter used to delay id reuse until in-flight searches finish.
#[derive(Debug, Default)]
pub struct ReaderEpochs {
    current: AtomicU64,
    active: Mutex<BTreeMap<u64, usize>>,
}

impl ReaderEpochs {
    /// Creates a counter at epoch 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reader at the current epoch until the pin is dropped.
    pub fn pin(&self) -> EpochPin<'_> {
        let mut active = self.active.lock();
        let epoch = self.current.load(Ordering::Acquire);
        *active.entry(epoch).or_insert(0) += 1;
        EpochPin {
            epochs: self,
            epoch,
        }
    }

    /// Starts a new epoch and returns the one that just ended.
    pub fn advance(&self) -> u64 {
        let _active = self.active.lock();
        self.current.fetch_add(1, Ordering::AcqRel)
    }

    /// Current epoch.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Oldest epoch some reader is still pinned at.
    #[must_use]
    pub fn oldest_pinned(&self) -> Option<u64> {
        self.active.lock().keys().next().copied()
    }

    /// Number of readers currently pinned.
    #[must_use]
    pub fn pinned_readers(&self) -> usize {
        self.active.lock().values().sum()
    }

    fn unpin(&self, epoch: u64) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&epoch) {
            *count -= 1;
            if *count == 0 {
                active.remove(&epoch);
            }
        }
    }
}

/// RAII registration of a reader in [`ReaderEpochs`].
#[derive(Debug)]
pub struct EpochPin<'a> {
    epochs: &'a ReaderEpochs,
    epoch: u64,
}

impl EpochPin<'_> {
    /// Epoch this reader started in.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Drop for EpochPin<'_> {
    fn drop(&mut self) {
        self.epochs.unpin(self.epoch);
    }
}
