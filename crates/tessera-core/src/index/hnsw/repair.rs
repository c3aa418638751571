//! Unlinking tombstoned nodes and repairing the lists that pointed at them.
//!
//! Runs while the structure gate is held exclusively, so no insert or delete
//! is in flight. Searches may still be walking the graph; they see each list
//! either before or after its rewrite, and removed nodes keep their records
//! until the very end, flagged deleted.
//!
//! The procedure is deterministic for a given graph, which lets replay of a
//! `Compact` record rebuild the exact same lists.

use super::candidate::Candidate;
use super::graph::HnswGraph;
use super::scratch::SearchScratch;
use super::search::Interrupt;
use crate::index::concurrency::NodeState;
use crate::types::InternalId;
use rustc_hash::FxHashSet;
use tracing::debug;

/// What a repair pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Nodes unlinked and dropped from the arena, ascending.
    pub removed: Vec<InternalId>,
    /// Neighbor lists rewritten.
    pub lists_repaired: usize,
}

impl HnswGraph {
    /// Removes `batch` from the graph and re-links every list that held one
    /// of its ids.
    ///
    /// For each affected list the new neighbors are chosen from the
    /// surviving neighbors, the surviving neighbors of the removed nodes, and
    /// (when that pool is short) a fresh local search on that level.
    /// Ids that are not in the arena are skipped.
    pub(crate) fn repair_and_remove(
        &self,
        batch: &[InternalId],
        scratch: &mut SearchScratch,
    ) -> RepairOutcome {
        let mut removed: Vec<InternalId> = batch
            .iter()
            .copied()
            .filter(|&id| self.node(id).is_some())
            .collect();
        removed.sort_unstable();
        removed.dedup();
        if removed.is_empty() {
            return RepairOutcome::default();
        }
        let doomed: FxHashSet<InternalId> = removed.iter().copied().collect();
        for &id in &removed {
            if let Some(node) = self.node(id) {
                node.transition(NodeState::Tombstoned, NodeState::Compacting);
            }
        }

        let mut lists_repaired = 0;
        let mut interrupt = Interrupt::never();
        for node in self.nodes_sorted() {
            let id = node.id();
            if doomed.contains(&id) {
                continue;
            }
            let Some(base) = self.store().get(id) else {
                continue;
            };

            for level in 0..=usize::from(node.level()) {
                let current = node.neighbors(level);
                if !current.iter().any(|n| doomed.contains(n)) {
                    continue;
                }
                let cap = self.params().cap(level);

                let mut seen: FxHashSet<InternalId> = FxHashSet::default();
                seen.insert(id);
                seen.extend(doomed.iter().copied());
                let mut pool_ids: Vec<InternalId> = current
                    .iter()
                    .copied()
                    .filter(|n| seen.insert(*n))
                    .collect();
                for gone in current.iter().filter(|n| doomed.contains(n)) {
                    let Some(gone_node) = self.node(*gone) else {
                        continue;
                    };
                    for n in gone_node.neighbors(level) {
                        if !seen.contains(&n) && self.is_live(n) {
                            seen.insert(n);
                            pool_ids.push(n);
                        }
                    }
                }

                let mut pool = self.score(base.vector(), pool_ids);
                if pool.len() < cap {
                    let entries: Vec<Candidate> = if pool.is_empty() {
                        self.descend_to(base.vector(), level, scratch, &mut interrupt)
                            .into_iter()
                            .collect()
                    } else {
                        pool.iter().map(|(c, _)| *c).collect()
                    };
                    let found = self.search_layer(
                        base.vector(),
                        &entries,
                        self.params().ef_construction,
                        level,
                        scratch,
                        |record| {
                            !record.is_deleted()
                                && record.internal_id() != id
                                && !doomed.contains(&record.internal_id())
                        },
                        &mut interrupt,
                    );
                    let extra: Vec<InternalId> = found
                        .iter()
                        .map(|c| c.id)
                        .filter(|n| seen.insert(*n))
                        .collect();
                    pool.extend(self.score(base.vector(), extra));
                    pool.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                }

                let selected = self
                    .params()
                    .selection
                    .select(self.metric(), &pool, cap);
                node.set_neighbors(level, selected.iter().map(|c| c.id).collect());
                lists_repaired += 1;
            }
        }

        for &id in &removed {
            if let Some(node) = self.unpublish(id) {
                node.clear_neighbors();
                node.transition(NodeState::Compacting, NodeState::Freed);
            }
            self.store().remove(id);
        }

        if self
            .entry_point()
            .is_some_and(|entry| doomed.contains(&entry.id))
        {
            let elected = self.elect_entry();
            self.restore_entry(elected);
        }

        debug!(
            removed = removed.len(),
            lists_repaired, "Compaction repair finished"
        );
        RepairOutcome {
            removed,
            lists_repaired,
        }
    }
}
