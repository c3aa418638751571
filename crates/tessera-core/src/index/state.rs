//! In-memory index state and the mutations applied to it.
//!
//! Each `apply_*` method is used twice: by the live write path, after its
//! WAL record is durable, and by recovery, when the record is replayed. The
//! `replay` entry point adds the checks that make replay idempotent for the
//! records after the restored snapshot: running the same tail twice leaves
//! the same state. Records the snapshot already covers are filtered out by
//! sequence number before they reach `replay` and are not safe to re-apply.

use super::concurrency::{NodeState, ReaderEpochs, StructureGate};
use super::hnsw::{GraphNode, HnswGraph, RepairOutcome, ScratchPool};
use super::tombstone::TombstoneSet;
use crate::error::{Error, Result};
use crate::storage::{IdAllocator, VectorRecord, WalOp, WalRecord};
use crate::types::{EntryPoint, InternalId};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Graph, id space, tombstones and the synchronization around them.
#[derive(Debug)]
pub struct IndexState {
    pub(crate) graph: HnswGraph,
    pub(crate) ids: IdAllocator,
    pub(crate) tombstones: TombstoneSet,
    pub(crate) epochs: ReaderEpochs,
    pub(crate) gate: StructureGate,
    pub(crate) scratch: ScratchPool,
}

impl IndexState {
    /// Wraps a graph and its allocator.
    #[must_use]
    pub fn new(graph: HnswGraph, ids: IdAllocator) -> Self {
        Self {
            graph,
            ids,
            tombstones: TombstoneSet::new(),
            epochs: ReaderEpochs::new(),
            gate: StructureGate::new(),
            scratch: ScratchPool::default(),
        }
    }

    /// The graph.
    #[must_use]
    pub fn graph(&self) -> &HnswGraph {
        &self.graph
    }

    /// Stores the vector and links a new node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if `id` is already in use.
    pub fn apply_insert(
        &self,
        id: InternalId,
        external_id: Uuid,
        level: u8,
        vector: Vec<f32>,
    ) -> Result<()> {
        if !self
            .graph
            .store()
            .put(VectorRecord::new(id, external_id, vector))
        {
            return Err(Error::Internal(format!("internal id {id} already in use")));
        }
        let node = Arc::new(GraphNode::new(id, level));
        if !self.graph.publish(Arc::clone(&node)) {
            self.graph.store().remove(id);
            return Err(Error::Internal(format!("graph node {id} already exists")));
        }
        let record = self
            .graph
            .store()
            .get(id)
            .ok_or_else(|| Error::Internal(format!("record {id} vanished during insert")))?;
        let mut scratch = self.scratch.acquire();
        self.graph.link(&node, record.vector(), &mut scratch);
        Ok(())
    }

    /// Tombstones a live node. Returns false if it was already deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for ids not in the graph.
    pub fn apply_delete(&self, id: InternalId) -> Result<bool> {
        let node = self.graph.node(id).ok_or(Error::NotFound(id))?;
        if !node.transition(NodeState::Live, NodeState::Tombstoned) {
            return Ok(false);
        }
        self.graph.store().mark_deleted(id)?;
        self.tombstones.insert(id);
        Ok(true)
    }

    /// Applies a logged entry point election.
    pub fn apply_set_entry(&self, entry: Option<EntryPoint>) {
        self.graph.apply_entry(entry);
    }

    /// Unlinks and frees tombstoned nodes, then retires their ids.
    pub fn apply_compact(&self, ids: &[InternalId]) -> RepairOutcome {
        let outcome = {
            let mut scratch = self.scratch.acquire();
            self.graph.repair_and_remove(ids, &mut scratch)
        };
        self.tombstones.remove_all(&outcome.removed);
        let epoch = self.epochs.advance();
        self.ids.retire(&outcome.removed, epoch);
        self.ids.reclaim(self.epochs.oldest_pinned());
        outcome
    }

    /// Re-applies a WAL record during recovery, skipping effects that are
    /// already present.
    ///
    /// Only records newer than the restored snapshot may be passed in. An
    /// older `Compact` would remove whatever node reused one of its ids.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying `apply_*` call.
    pub fn replay(&self, record: WalRecord) -> Result<()> {
        match record.op {
            WalOp::Insert {
                internal_id,
                external_id,
                level,
                vector,
            } => {
                if self.graph.node(internal_id).is_some() {
                    debug!(seq = record.seq, internal_id, "Insert already applied");
                    return Ok(());
                }
                self.ids.claim(internal_id);
                self.apply_insert(internal_id, external_id, level, vector)
            }
            WalOp::Delete { internal_id } => {
                match self.graph.node(internal_id) {
                    Some(node) if node.state() == NodeState::Live => {
                        self.apply_delete(internal_id)?;
                    }
                    _ => debug!(seq = record.seq, internal_id, "Delete already applied"),
                }
                Ok(())
            }
            WalOp::SetEntryPoint { entry } => {
                self.apply_set_entry(entry);
                Ok(())
            }
            WalOp::Compact { ids } => {
                self.apply_compact(&ids);
                Ok(())
            }
        }
    }
}
