//! Set of deleted ids awaiting compaction.

use crate::types::InternalId;
use parking_lot::Mutex;
use roaring::RoaringTreemap;

/// Tombstoned ids not yet unlinked, as a compressed bitmap.
#[derive(Debug, Default)]
pub struct TombstoneSet {
    ids: Mutex<RoaringTreemap>,
}

impl TombstoneSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an id. Returns false if it was already present.
    pub fn insert(&self, id: InternalId) -> bool {
        self.ids.lock().insert(id)
    }

    /// True if `id` awaits compaction.
    #[must_use]
    pub fn contains(&self, id: InternalId) -> bool {
        self.ids.lock().contains(id)
    }

    /// Number of pending ids.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.ids.lock().len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    /// The `limit` lowest pending ids, left in the set.
    #[must_use]
    pub fn peek_batch(&self, limit: usize) -> Vec<InternalId> {
        self.ids.lock().iter().take(limit).collect()
    }

    /// Drops ids that compaction has freed.
    pub fn remove_all(&self, ids: &[InternalId]) {
        let mut set = self.ids.lock();
        for &id in ids {
            set.remove(id);
        }
    }

    /// All pending ids, ascending.
    #[must_use]
    pub fn to_vec(&self) -> Vec<InternalId> {
        self.ids.lock().iter().collect()
    }
}
