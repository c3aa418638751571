//! Lock-sharded vector storage keyed by internal id.
//!
//! Records are spread across 16 shards by `internal_id % 16`, so writers
//! touching different ids never contend. Records are handed out as
//! `Arc<VectorRecord>`: callers copy the pointer under a brief shard read
//! lock and compute distances with no lock held.

use crate::types::InternalId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Number of shards for vector storage.
pub(crate) const NUM_SHARDS: usize = 16;

/// A stored vector and its identity.
#[derive(Debug)]
pub struct VectorRecord {
    internal_id: InternalId,
    external_id: Uuid,
    vector: Box<[f32]>,
    deleted: AtomicBool,
}

impl VectorRecord {
    /// Creates a live record.
    #[must_use]
    pub fn new(internal_id: InternalId, external_id: Uuid, vector: Vec<f32>) -> Self {
        Self {
            internal_id,
            external_id,
            vector: vector.into_boxed_slice(),
            deleted: AtomicBool::new(false),
        }
    }

    /// Internal id.
    #[must_use]
    pub fn internal_id(&self) -> InternalId {
        self.internal_id
    }

    /// Caller-supplied object id.
    #[must_use]
    pub fn external_id(&self) -> Uuid {
        self.external_id
    }

    /// The stored (prepared) vector.
    #[must_use]
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    /// True once the record has been tombstoned.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

/// Sharded map of internal id to vector record, with an external id index.
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    shards: [RwLock<FxHashMap<InternalId, Arc<VectorRecord>>>; NUM_SHARDS],
    external: [RwLock<FxHashMap<Uuid, InternalId>>; NUM_SHARDS],
    len: AtomicUsize,
    deleted: AtomicUsize,
}

impl VectorStore {
    /// Creates an empty store for vectors of `dimension` components.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            shards: std::array::from_fn(|_| RwLock::new(FxHashMap::default())),
            external: std::array::from_fn(|_| RwLock::new(FxHashMap::default())),
            len: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
        }
    }

    #[inline]
    const fn shard_index(id: InternalId) -> usize {
        (id % NUM_SHARDS as u64) as usize
    }

    #[inline]
    fn external_shard(external_id: &Uuid) -> usize {
        (external_id.as_u128() % NUM_SHARDS as u128) as usize
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Stores a record. Returns false (and stores nothing) if the id is taken.
    pub fn put(&self, record: VectorRecord) -> bool {
        debug_assert_eq!(record.vector.len(), self.dimension);
        let id = record.internal_id;
        let external_id = record.external_id;
        let deleted = record.is_deleted();
        {
            let mut shard = self.shards[Self::shard_index(id)].write();
            if shard.contains_key(&id) {
                return false;
            }
            shard.insert(id, Arc::new(record));
        }
        self.len.fetch_add(1, Ordering::Relaxed);
        if deleted {
            self.deleted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.external[Self::external_shard(&external_id)]
                .write()
                .insert(external_id, id);
        }
        true
    }

    /// Restores a record with an explicit tombstone flag (snapshot load).
    pub(crate) fn put_restored(&self, record: VectorRecord, deleted: bool) -> bool {
        record.deleted.store(deleted, Ordering::Release);
        self.put(record)
    }

    /// Returns the record for `id`, tombstoned or not.
    #[must_use]
    pub fn get(&self, id: InternalId) -> Option<Arc<VectorRecord>> {
        self.shards[Self::shard_index(id)].read().get(&id).cloned()
    }

    /// Fetches several records, one shard lock acquisition per id.
    ///
    /// `out` is cleared first and receives one entry per input id, `None`
    /// where the record is gone.
    pub fn get_many(&self, ids: &[InternalId], out: &mut Vec<Option<Arc<VectorRecord>>>) {
        out.clear();
        out.extend(ids.iter().map(|&id| self.get(id)));
    }

    /// Returns the live internal id registered for an external id.
    #[must_use]
    pub fn lookup_external(&self, external_id: &Uuid) -> Option<InternalId> {
        self.external[Self::external_shard(external_id)]
            .read()
            .get(external_id)
            .copied()
    }

    /// Sets the tombstone flag. Returns false if it was already set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for unknown ids.
    pub fn mark_deleted(&self, id: InternalId) -> crate::Result<bool> {
        let record = self.get(id).ok_or(crate::Error::NotFound(id))?;
        if record.deleted.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.deleted.fetch_add(1, Ordering::Relaxed);
        self.unmap_external(&record);
        Ok(true)
    }

    /// Physically removes a record. Only compaction calls this.
    pub fn remove(&self, id: InternalId) -> Option<Arc<VectorRecord>> {
        let record = self.shards[Self::shard_index(id)].write().remove(&id)?;
        self.len.fetch_sub(1, Ordering::Relaxed);
        if record.is_deleted() {
            self.deleted.fetch_sub(1, Ordering::Relaxed);
        } else {
            self.unmap_external(&record);
        }
        Some(record)
    }

    fn unmap_external(&self, record: &VectorRecord) {
        let mut shard = self.external[Self::external_shard(&record.external_id)].write();
        if shard.get(&record.external_id) == Some(&record.internal_id) {
            shard.remove(&record.external_id);
        }
    }

    /// Number of stored records, tombstoned included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records that are not tombstoned.
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.len().saturating_sub(self.deleted.load(Ordering::Relaxed))
    }

    /// All records ordered by internal id.
    ///
    /// Consistent only while writers are excluded (snapshot capture holds the
    /// structure gate exclusively).
    #[must_use]
    pub fn records(&self) -> Vec<Arc<VectorRecord>> {
        let mut all: Vec<Arc<VectorRecord>> = self
            .shards
            .iter()
            .flat_map(|shard| shard.read().values().cloned().collect::<Vec<_>>())
            .collect();
        all.sort_unstable_by_key(|r| r.internal_id);
        all
    }
}
