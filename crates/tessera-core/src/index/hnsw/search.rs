//! Layer search: greedy descent and the `ef`-bounded beam.
//!
//! Locks are held only while copying a neighbor list or cloning a record
//! handle; every distance is computed with no lock held.
//!
//! Tombstoned nodes and nodes rejected by the caller's filter are still
//! expanded, they just never enter the result heap. Restricting traversal
//! instead would cut the graph apart and miss valid matches.

use super::candidate::Candidate;
use super::graph::HnswGraph;
use super::scratch::SearchScratch;
use crate::index::request::{CancellationToken, Predicate};
use crate::storage::VectorRecord;
use std::cmp::Reverse;
use std::time::Instant;

/// Deadline and cancellation watcher for one query.
#[derive(Debug)]
pub struct Interrupt<'a> {
    deadline: Option<Instant>,
    token: Option<&'a CancellationToken>,
    interval: usize,
    countdown: usize,
    fired: bool,
}

impl<'a> Interrupt<'a> {
    /// Watches `deadline` and `token`, polling every `interval` expansions.
    #[must_use]
    pub fn new(
        deadline: Option<Instant>,
        token: Option<&'a CancellationToken>,
        interval: usize,
    ) -> Self {
        let interval = interval.max(1);
        Self {
            deadline,
            token,
            interval,
            countdown: interval,
            fired: false,
        }
    }

    /// Never fires (insert and repair).
    #[must_use]
    pub fn never() -> Self {
        Self::new(None, None, usize::MAX)
    }

    /// Polls now. Once fired, stays fired.
    pub fn check(&mut self) -> bool {
        if !self.fired {
            self.fired = self.token.is_some_and(CancellationToken::is_cancelled)
                || self.deadline.is_some_and(|d| Instant::now() >= d);
        }
        self.fired
    }

    /// Counts one expansion and polls every `interval` of them.
    pub fn tick(&mut self) -> bool {
        if self.fired {
            return true;
        }
        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = self.interval;
            return self.check();
        }
        false
    }

    /// True once the deadline passed or the token was cancelled.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired
    }
}

/// Result of a top-level search.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Eligible nodes, ascending by (distance, id), at most `k`.
    pub hits: Vec<Candidate>,
    /// True if the search stopped early.
    pub interrupted: bool,
}

impl HnswGraph {
    /// Walks `level` greedily from `start`, one node at a time, until no
    /// neighbor is closer. Tombstoned nodes are valid stepping stones.
    pub(crate) fn greedy_closest(
        &self,
        query: &[f32],
        start: Candidate,
        level: usize,
        scratch: &mut SearchScratch,
    ) -> Candidate {
        let mut best = start;
        loop {
            let Some(node) = self.node(best.id) else {
                return best;
            };
            node.copy_neighbors_into(level, &mut scratch.neighbors);
            self.store().get_many(&scratch.neighbors, &mut scratch.records);

            let mut improved = false;
            for record in scratch.records.iter().flatten() {
                let candidate = Candidate::new(
                    record.internal_id(),
                    self.metric().distance(query, record.vector()),
                );
                if candidate < best {
                    best = candidate;
                    improved = true;
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Greedy descent from the entry point down to `level`.
    ///
    /// Returns `None` when the graph is empty or the entry point vanished.
    pub(crate) fn descend_to(
        &self,
        query: &[f32],
        level: usize,
        scratch: &mut SearchScratch,
        interrupt: &mut Interrupt<'_>,
    ) -> Option<Candidate> {
        let entry = self.entry_point()?;
        let (distance, _) = self.distance_to(query, entry.id)?;
        let mut current = Candidate::new(entry.id, distance);
        for lvl in (level + 1..=usize::from(entry.level)).rev() {
            if interrupt.check() {
                break;
            }
            current = self.greedy_closest(query, current, lvl, scratch);
        }
        Some(current)
    }

    /// Beam search on one level.
    ///
    /// Every reachable node is a traversal candidate; only nodes accepted by
    /// `eligible` are kept as results. Returns at most `ef` results sorted by
    /// ascending (distance, id).
    pub(crate) fn search_layer<E>(
        &self,
        query: &[f32],
        entries: &[Candidate],
        ef: usize,
        level: usize,
        scratch: &mut SearchScratch,
        eligible: E,
        interrupt: &mut Interrupt<'_>,
    ) -> Vec<Candidate>
    where
        E: Fn(&VectorRecord) -> bool,
    {
        scratch.reset();
        let SearchScratch {
            visited,
            candidates,
            results,
            neighbors,
            records,
        } = scratch;

        for &entry in entries {
            if !visited.insert(entry.id) {
                continue;
            }
            let Some(record) = self.store().get(entry.id) else {
                continue;
            };
            candidates.push(Reverse(entry));
            if eligible(record.as_ref()) {
                results.push(entry);
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if interrupt.tick() {
                break;
            }
            let exhausted = results.len() >= ef
                && results
                    .peek()
                    .is_some_and(|far| current.distance > far.distance);
            if exhausted {
                break;
            }
            let Some(node) = self.node(current.id) else {
                continue;
            };
            node.copy_neighbors_into(level, neighbors);
            neighbors.retain(|&id| visited.insert(id));
            if neighbors.is_empty() {
                continue;
            }
            self.store().get_many(neighbors, records);

            for record in records.iter().flatten() {
                let candidate = Candidate::new(
                    record.internal_id(),
                    self.metric().distance(query, record.vector()),
                );
                let admit = results.len() < ef
                    || results.peek().is_some_and(|far| candidate.distance < far.distance);
                if !admit {
                    continue;
                }
                candidates.push(Reverse(candidate));
                if eligible(record.as_ref()) {
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<Candidate> = results.drain().collect();
        found.sort_unstable();
        candidates.clear();
        records.clear();
        found
    }

    /// Finds the `k` nearest live nodes accepted by `filter`.
    ///
    /// `ef` is raised to at least `k`.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&dyn Predicate>,
        scratch: &mut SearchScratch,
        interrupt: &mut Interrupt<'_>,
    ) -> SearchOutcome {
        if k == 0 {
            return SearchOutcome::default();
        }
        let eligible = |record: &VectorRecord| {
            !record.is_deleted() && filter.map_or(true, |f| f.matches(&record.external_id()))
        };

        let Some(start) = self.descend_to(query, 0, scratch, interrupt) else {
            return SearchOutcome::default();
        };
        if interrupt.fired() {
            let hits = self
                .store()
                .get(start.id)
                .filter(|r| eligible(r.as_ref()))
                .map(|_| vec![start])
                .unwrap_or_default();
            return SearchOutcome {
                hits,
                interrupted: true,
            };
        }

        let ef = ef.max(k);
        let mut hits = self.search_layer(query, &[start], ef, 0, scratch, eligible, interrupt);
        hits.truncate(k);
        SearchOutcome {
            hits,
            interrupted: interrupt.fired(),
        }
    }
}
