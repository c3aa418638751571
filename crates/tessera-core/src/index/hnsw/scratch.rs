//! Per-query scratch space and its pool.
//!
//! A search needs a visited set, two heaps and a couple of buffers. They are
//! borrowed from a [`ScratchPool`] for the duration of one query and handed
//! back on drop, so steady-state searches allocate nothing and no two
//! queries ever share one.

use super::candidate::Candidate;
use crate::storage::VectorRecord;
use crate::types::InternalId;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Visited marks indexed by internal id.
///
/// Clearing bumps a generation counter instead of zeroing the array.
#[derive(Debug)]
pub struct VisitedSet {
    marks: Vec<u32>,
    generation: u32,
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self {
            marks: Vec::new(),
            generation: 1,
        }
    }
}

impl VisitedSet {
    /// Forgets every mark.
    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.marks.fill(0);
            self.generation = 1;
        }
    }

    /// Marks `id`. Returns true if it was not marked yet.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, id: InternalId) -> bool {
        let idx = id as usize;
        if idx >= self.marks.len() {
            let len = (idx + 1).max(self.marks.len() * 2).max(1024);
            self.marks.resize(len, 0);
        }
        if self.marks[idx] == self.generation {
            return false;
        }
        self.marks[idx] = self.generation;
        true
    }

    /// True if `id` is marked.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn contains(&self, id: InternalId) -> bool {
        self.marks
            .get(id as usize)
            .is_some_and(|&g| g == self.generation)
    }
}

/// Buffers reused across the levels of one query.
#[derive(Debug, Default)]
pub struct SearchScratch {
    /// Visited marks.
    pub visited: VisitedSet,
    /// Frontier, nearest first.
    pub candidates: BinaryHeap<Reverse<Candidate>>,
    /// Best results so far, farthest first.
    pub results: BinaryHeap<Candidate>,
    /// Neighbor ids copied out of a node's list.
    pub neighbors: Vec<InternalId>,
    /// Records fetched for `neighbors`.
    pub records: Vec<Option<Arc<VectorRecord>>>,
}

impl SearchScratch {
    /// Resets everything for a new level.
    pub fn reset(&mut self) {
        self.visited.clear();
        self.candidates.clear();
        self.results.clear();
        self.neighbors.clear();
        self.records.clear();
    }
}

/// Free list of [`SearchScratch`] values.
#[derive(Debug)]
pub struct ScratchPool {
    free: Mutex<Vec<SearchScratch>>,
    max_pooled: usize,
}

impl ScratchPool {
    /// Creates a pool keeping at most `max_pooled` idle scratches.
    #[must_use]
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_pooled,
        }
    }

    /// Borrows a scratch until the guard drops.
    pub fn acquire(&self) -> ScratchGuard<'_> {
        let scratch = self.free.lock().pop().unwrap_or_default();
        ScratchGuard {
            pool: self,
            scratch,
        }
    }

    /// Number of idle scratches.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut scratch: SearchScratch) {
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            scratch.reset();
            free.push(scratch);
        }
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Borrowed scratch, returned to its pool on drop.
#[derive(Debug)]
pub struct ScratchGuard<'a> {
    pool: &'a ScratchPool,
    scratch: SearchScratch,
}

impl Deref for ScratchGuard<'_> {
    type Target = SearchScratch;

    fn deref(&self) -> &SearchScratch {
        &self.scratch
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut SearchScratch {
        &mut self.scratch
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.scratch));
    }
}
