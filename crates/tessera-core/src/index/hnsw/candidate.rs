//! Distance-ordered node handle for `BinaryHeap`.
//!
//! Ordered by `f32::total_cmp` on the distance, then by ascending id, so
//! heaps and sorts are total and ties resolve deterministically.

use crate::types::InternalId;
use std::cmp::Ordering;

/// A node id paired with its distance to the current query.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Distance to the query (lower is closer).
    pub distance: f32,
    /// Node id.
    pub id: InternalId,
}

impl Candidate {
    /// Creates a candidate.
    #[must_use]
    pub const fn new(id: InternalId, distance: f32) -> Self {
        Self { distance, id }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}
