//! Write path, read path and bookkeeping shared by the facade and the
//! background workers.
//!
//! Every mutation follows the same order: validate, enter the structure gate,
//! append to the WAL, apply in memory. A failed append leaves memory
//! untouched and hands the allocated id back.

use super::checkpoint::SnapshotMessage;
use super::compaction::CompactionMessage;
use super::concurrency::NodeState;
use super::hnsw::{HnswGraph, Interrupt, LevelGenerator};
use super::hnsw_index::IndexStats;
use super::request::{CancelPolicy, SearchRequest};
use super::state::IndexState;
use crate::config::TesseraConfig;
use crate::error::{Error, Result};
use crate::storage::{IndexMeta, Wal, WalOp};
use crate::types::{InternalId, SearchHit};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Channels to the background workers.
#[derive(Debug, Default)]
pub(crate) struct WorkerLinks {
    pub(crate) compaction: Option<Sender<CompactionMessage>>,
    pub(crate) snapshot: Option<Sender<SnapshotMessage>>,
}

/// Everything an open index owns.
pub(crate) struct Engine {
    pub(crate) dir: PathBuf,
    pub(crate) meta: IndexMeta,
    pub(crate) config: TesseraConfig,
    pub(crate) state: IndexState,
    pub(crate) wal: Wal,
    pub(crate) levels: Box<dyn LevelGenerator>,
    pub(crate) links: WorkerLinks,
    pub(crate) closed: AtomicBool,
    pub(crate) last_snapshot_seq: AtomicU64,
    pub(crate) snapshot_lock: Mutex<()>,
    pub(crate) compaction_lock: Mutex<()>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.dir)
            .field("meta", &self.meta)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub(crate) fn graph(&self) -> &HnswGraph {
        &self.state.graph
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Inserts a vector and returns its internal id.
    pub(crate) fn insert(&self, vector: &[f32], external_id: Uuid) -> Result<InternalId> {
        self.ensure_open()?;
        let prepared = self.meta.metric.prepare(vector, self.meta.dimension)?;

        let id = {
            let _gate = self.state.gate.shared();
            if self.state.ids.retired_len() > 0 {
                self.state.ids.reclaim(self.state.epochs.oldest_pinned());
            }
            let id = self.state.ids.allocate();
            let level = self.levels.next_level().min(self.meta.max_level);

            let op = WalOp::Insert {
                internal_id: id,
                external_id,
                level,
                vector: prepared.clone(),
            };
            if let Err(e) = self.wal.append(&op) {
                self.state.ids.release(id);
                return Err(e);
            }
            self.state.apply_insert(id, external_id, level, prepared)?;
            trace!(internal_id = id, level, "Inserted");
            self.repair_entry();
            id
        };

        self.nudge_snapshot();
        Ok(id)
    }

    /// Tombstones a node. Deleting an already deleted node is a no-op.
    pub(crate) fn delete(&self, id: InternalId) -> Result<()> {
        self.ensure_open()?;
        {
            let _gate = self.state.gate.shared();
            let node = self.graph().node(id).ok_or(Error::NotFound(id))?;
            if node.state() != NodeState::Live {
                return Ok(());
            }

            self.wal.append(&WalOp::Delete { internal_id: id })?;
            if !self.state.apply_delete(id)? {
                return Ok(());
            }
            trace!(internal_id = id, "Tombstoned");

            if let Some(tx) = &self.links.compaction {
                let _ = tx.try_send(CompactionMessage::Tombstoned(id));
            }
            self.repair_entry();
        }

        self.nudge_snapshot();
        Ok(())
    }

    /// Deletes the live node registered for an external id.
    pub(crate) fn delete_external(&self, external_id: &Uuid) -> Result<InternalId> {
        self.ensure_open()?;
        let id = self
            .graph()
            .store()
            .lookup_external(external_id)
            .ok_or_else(|| {
                Error::InvalidParameter(format!("no live object with external id {external_id}"))
            })?;
        self.delete(id)?;
        Ok(id)
    }

    /// Re-elects the entry point if it is no longer live.
    ///
    /// Runs after a mutation is already logged and applied, so a failure
    /// here is not reported to the caller. The dead entry point stays usable
    /// for routing and the next mutation tries again.
    fn repair_entry(&self) {
        let stale = self
            .graph()
            .entry_point()
            .is_some_and(|e| !self.graph().is_live(e.id));
        if !stale {
            return;
        }
        if let Err(e) = self.reelect_entry() {
            warn!(error = %e, "Entry point re-election failed, will retry");
        }
    }

    /// Replaces a dead entry point with the best live node and logs it.
    pub(crate) fn reelect_entry(&self) -> Result<()> {
        let _election = self.graph().election_lock();
        let current = self.graph().entry_point();
        if current.is_some_and(|e| self.graph().is_live(e.id)) {
            return Ok(());
        }
        let elected = self.graph().elect_entry();
        if current.is_none() && elected.is_none() {
            return Ok(());
        }
        self.wal.append(&WalOp::SetEntryPoint { entry: elected })?;
        self.state.apply_set_entry(elected);
        debug!(?current, ?elected, "Entry point re-elected");
        Ok(())
    }

    /// Runs a k-NN query.
    pub(crate) fn search(&self, query: &[f32], request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.ensure_open()?;
        let k = request.k();
        if k == 0 || k > self.config.search.max_k {
            return Err(Error::InvalidParameter(format!(
                "k must be between 1 and {}, got {k}",
                self.config.search.max_k
            )));
        }
        if request.ef() == Some(0) {
            return Err(Error::InvalidParameter("ef must be positive".to_string()));
        }
        let prepared = self.meta.metric.prepare(query, self.meta.dimension)?;

        let _pin = self.state.epochs.pin();
        let mut scratch = self.state.scratch.acquire();
        let mut interrupt = Interrupt::new(
            request.deadline(),
            request.cancellation(),
            self.config.search.cancel_check_interval,
        );
        let fail_on_cancel = request.cancel_policy() == CancelPolicy::Fail;
        if interrupt.check() {
            return if fail_on_cancel {
                Err(Error::Cancelled)
            } else {
                Ok(Vec::new())
            };
        }

        let ef = request.ef().unwrap_or(self.config.search.ef_search);
        let outcome = self.graph().search(
            &prepared,
            k,
            ef,
            request.filter(),
            &mut scratch,
            &mut interrupt,
        );
        if outcome.interrupted {
            debug!(found = outcome.hits.len(), "Search interrupted");
            if fail_on_cancel {
                return Err(Error::Cancelled);
            }
        }

        Ok(outcome
            .hits
            .into_iter()
            .filter_map(|c| {
                let record = self.graph().store().get(c.id)?;
                Some(SearchHit {
                    internal_id: c.id,
                    external_id: record.external_id(),
                    distance: c.distance,
                })
            })
            .collect())
    }

    /// External id and stored vector of a live node.
    pub(crate) fn get(&self, id: InternalId) -> Option<(Uuid, Vec<f32>)> {
        let record = self.graph().store().get(id)?;
        if record.is_deleted() {
            return None;
        }
        Some((record.external_id(), record.vector().to_vec()))
    }

    /// Asks the snapshot worker for a snapshot once enough WAL piled up.
    fn nudge_snapshot(&self) {
        let threshold = self.config.snapshot.wal_bytes_threshold;
        if threshold == 0 || self.wal.bytes_since_checkpoint() < threshold {
            return;
        }
        if let Some(tx) = &self.links.snapshot {
            let _ = tx.try_send(SnapshotMessage::Trigger);
        }
    }

    pub(crate) fn stats(&self) -> IndexStats {
        let graph = self.graph();
        IndexStats {
            dimension: self.meta.dimension,
            metric: self.meta.metric,
            live: graph.store().live_len(),
            tombstoned: self.state.tombstones.len(),
            nodes: graph.len(),
            max_level: graph.max_level(),
            entry_point: graph.entry_point(),
            last_sequence: self.wal.last_seq(),
            last_snapshot_sequence: self.last_snapshot_seq.load(Ordering::Acquire),
            wal_bytes_since_snapshot: self.wal.bytes_since_checkpoint(),
            retired_ids: self.state.ids.retired_len(),
        }
    }
}
