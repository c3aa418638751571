//! Internal id allocation with deferred reuse.
//!
//! Ids are handed out lowest-free-first so the id space stays dense (the
//! visited set in the search scratch is a flat array indexed by id). An id
//! freed by compaction is *retired* with the reader epoch at which it was
//! unlinked; it only returns to the free list once every search pinned at or
//! before that epoch has finished, so a stale id held in some query's scratch
//! state can never alias a newly inserted node.

use crate::types::InternalId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Default)]
struct AllocState {
    next: InternalId,
    free: BTreeSet<InternalId>,
    retired: VecDeque<(u64, InternalId)>,
}

/// Allocator for internal ids.
#[derive(Debug, Default)]
pub struct IdAllocator {
    state: Mutex<AllocState>,
}

impl IdAllocator {
    /// Creates an allocator that starts at id 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an allocator from persisted state. Every id below `next` that
    /// is not in use must be listed in `free`.
    #[must_use]
    pub fn restore(next: InternalId, free: impl IntoIterator<Item = InternalId>) -> Self {
        Self {
            state: Mutex::new(AllocState {
                next,
                free: free.into_iter().collect(),
                retired: VecDeque::new(),
            }),
        }
    }

    /// Hands out the lowest reusable id, or a fresh one.
    pub fn allocate(&self) -> InternalId {
        let mut state = self.state.lock();
        if let Some(id) = state.free.pop_first() {
            return id;
        }
        let id = state.next;
        state.next += 1;
        id
    }

    /// Returns an id that was allocated but never published.
    pub fn release(&self, id: InternalId) {
        self.state.lock().free.insert(id);
    }

    /// Marks an explicit id as used (WAL replay).
    pub fn claim(&self, id: InternalId) {
        let mut state = self.state.lock();
        if id >= state.next {
            let start = state.next;
            state.free.extend(start..id);
            state.next = id + 1;
        } else {
            state.free.remove(&id);
            if let Some(pos) = state.retired.iter().position(|&(_, r)| r == id) {
                state.retired.remove(pos);
            }
        }
    }

    /// Parks freed ids until readers pinned at or before `epoch` are gone.
    pub fn retire(&self, ids: &[InternalId], epoch: u64) {
        let mut state = self.state.lock();
        state.retired.extend(ids.iter().map(|&id| (epoch, id)));
    }

    /// Moves retired ids whose epoch is older than `oldest_pinned` to the
    /// free list. `None` means no reader is pinned. Returns how many moved.
    pub fn reclaim(&self, oldest_pinned: Option<u64>) -> usize {
        let mut state = self.state.lock();
        let mut moved = 0;
        while let Some(&(epoch, id)) = state.retired.front() {
            if oldest_pinned.is_some_and(|oldest| oldest <= epoch) {
                break;
            }
            state.retired.pop_front();
            state.free.insert(id);
            moved += 1;
        }
        moved
    }

    /// Next never-used id.
    #[must_use]
    pub fn next_id(&self) -> InternalId {
        self.state.lock().next
    }

    /// Ids that are not in use (free and retired), ascending.
    #[must_use]
    pub fn unused_ids(&self) -> Vec<InternalId> {
        let state = self.state.lock();
        let mut ids: Vec<InternalId> = state
            .free
            .iter()
            .copied()
            .chain(state.retired.iter().map(|&(_, id)| id))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of retired ids still waiting for readers to drain.
    #[must_use]
    pub fn retired_len(&self) -> usize {
        self.state.lock().retired.len()
    }
}
