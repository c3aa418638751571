//! Linking a new node into the graph.
//!
//! # Lock Ordering
//!
//! A neighbor list lock is never held while waiting on another list lock.
//! Prunes are computed on a copy with no lock held and committed only if the
//! list version did not move; after a few lost races the prune runs under
//! the list's write lock (store shard reads never wait on list locks).

use super::candidate::Candidate;
use super::graph::HnswGraph;
use super::node::GraphNode;
use super::scratch::SearchScratch;
use super::search::Interrupt;
use crate::types::{EntryPoint, InternalId};
use rustc_hash::FxHashSet;

/// Optimistic prune attempts before falling back to a locked prune.
const PRUNE_RETRIES: usize = 3;

impl HnswGraph {
    /// Connects a published node to its neighbors on every level it reaches.
    ///
    /// The node's own lists are written before any back-link, so the node
    /// only becomes reachable once it is fully wired on that level.
    pub(crate) fn link(&self, node: &GraphNode, vector: &[f32], scratch: &mut SearchScratch) {
        let id = node.id();
        let level = node.level();
        let own_entry = EntryPoint { id, level };
        if self.init_entry_if_empty(own_entry) {
            return;
        }
        let Some(entry) = self.entry_point() else {
            self.offer_entry(own_entry);
            return;
        };

        let mut interrupt = Interrupt::never();
        let top = usize::from(level.min(entry.level));
        let Some(start) = self.descend_to(vector, top, scratch, &mut interrupt) else {
            self.offer_entry(own_entry);
            return;
        };

        let mut entries = vec![start];
        for lvl in (0..=top).rev() {
            let found = self.search_layer(
                vector,
                &entries,
                self.params().ef_construction,
                lvl,
                scratch,
                |record| !record.is_deleted() && record.internal_id() != id,
                &mut interrupt,
            );
            let selected = self.select_for(id, vector, &found, lvl);
            node.set_neighbors(lvl, selected.iter().map(|c| c.id).collect());
            for neighbor in &selected {
                self.add_link(neighbor.id, id, lvl);
            }
            if !found.is_empty() {
                entries = found;
            }
        }

        self.offer_entry(own_entry);
    }

    /// Applies the selection policy to a search result.
    pub(crate) fn select_for(
        &self,
        base_id: InternalId,
        base: &[f32],
        found: &[Candidate],
        level: usize,
    ) -> Vec<Candidate> {
        let policy = self.params().selection;
        let mut ids: Vec<InternalId> = found.iter().map(|c| c.id).collect();

        if policy.extends_candidates() {
            let mut seen: FxHashSet<InternalId> = ids.iter().copied().collect();
            seen.insert(base_id);
            for c in found {
                let Some(node) = self.node(c.id) else {
                    continue;
                };
                for n in node.neighbors(level) {
                    if seen.insert(n) && self.is_live(n) {
                        ids.push(n);
                    }
                }
            }
        }

        let pool = self.score(base, ids);
        policy.select(self.metric(), &pool, self.params().cap(level))
    }

    /// Adds `new_id` to `target`'s list at `level`, pruning the weakest edge
    /// when the list is full.
    pub(crate) fn add_link(&self, target: InternalId, new_id: InternalId, level: usize) {
        let Some(node) = self.node(target) else {
            return;
        };
        let Some(layer) = node.layer(level) else {
            return;
        };
        let cap = self.params().cap(level);

        for _ in 0..PRUNE_RETRIES {
            let (snapshot, version) = {
                let mut list = layer.write();
                if list.ids.contains(&new_id) {
                    return;
                }
                if list.ids.len() < cap {
                    list.ids.push(new_id);
                    list.version += 1;
                    return;
                }
                (list.ids.clone(), list.version)
            };

            let kept = self.prune(target, &snapshot, new_id, cap);
            let mut list = layer.write();
            if list.version == version {
                list.replace(kept);
                return;
            }
        }

        let mut list = layer.write();
        if list.ids.contains(&new_id) {
            return;
        }
        if list.ids.len() < cap {
            list.ids.push(new_id);
            list.version += 1;
            return;
        }
        let snapshot = list.ids.clone();
        let kept = self.prune(target, &snapshot, new_id, cap);
        list.replace(kept);
    }

    /// The `cap` closest of `current ∪ {new_id}` as seen from `target`.
    fn prune(
        &self,
        target: InternalId,
        current: &[InternalId],
        new_id: InternalId,
        cap: usize,
    ) -> Vec<InternalId> {
        let Some(base) = self.store().get(target) else {
            return current.to_vec();
        };
        self.score(
            base.vector(),
            current.iter().copied().chain(std::iter::once(new_id)),
        )
        .into_iter()
        .take(cap)
        .map(|(c, _)| c.id)
        .collect()
    }
}
