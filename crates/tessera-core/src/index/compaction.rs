//! Tombstone compaction and its background worker.
//!
//! A cycle takes up to `batch_size` tombstoned ids, logs them as one
//! `Compact` record and unlinks them while holding the structure gate
//! exclusively. Inserts and deletes wait for that section; searches do not.
//!
//! The worker is a plain thread fed over a channel: deletes report each new
//! tombstone, the facade can request an immediate run, and an idle timeout
//! drives interval-based cycles.

use super::concurrency::NodeState;
use super::engine::Engine;
use crate::error::{Error, Result};
use crate::storage::WalOp;
use crate::types::InternalId;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one or more compaction cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Nodes unlinked and freed.
    pub removed: usize,
    /// Neighbor lists rebuilt.
    pub lists_repaired: usize,
    /// Batches processed.
    pub batches: usize,
    /// Tombstones still pending afterwards.
    pub remaining: u64,
    /// Wall time spent.
    pub duration: Duration,
}

impl CompactionStats {
    fn absorb(&mut self, other: &Self) {
        self.removed += other.removed;
        self.lists_repaired += other.lists_repaired;
        self.batches += other.batches;
        self.remaining = other.remaining;
        self.duration += other.duration;
    }
}

impl Engine {
    /// Compacts at most one batch.
    pub(crate) fn compact_batch(&self) -> Result<CompactionStats> {
        let _cycle = self.compaction_lock.lock();
        let started = Instant::now();
        let candidates = self
            .state
            .tombstones
            .peek_batch(self.config.compaction.batch_size);
        if candidates.is_empty() {
            return Ok(CompactionStats::default());
        }

        let outcome = {
            let _gate = self.state.gate.exclusive();
            let ids: Vec<InternalId> = candidates
                .into_iter()
                .filter(|&id| {
                    self.graph()
                        .node(id)
                        .is_some_and(|n| n.state() == NodeState::Tombstoned)
                })
                .collect();
            if ids.is_empty() {
                return Ok(CompactionStats::default());
            }
            self.wal.append(&WalOp::Compact { ids: ids.clone() })?;
            self.state.apply_compact(&ids)
        };

        let stats = CompactionStats {
            removed: outcome.removed.len(),
            lists_repaired: outcome.lists_repaired,
            batches: 1,
            remaining: self.state.tombstones.len(),
            duration: started.elapsed(),
        };
        info!(
            removed = stats.removed,
            lists_repaired = stats.lists_repaired,
            remaining = stats.remaining,
            elapsed_ms = stats.duration.as_millis(),
            "Compaction cycle finished"
        );
        Ok(stats)
    }

    /// Compacts batches until no tombstone is left.
    pub(crate) fn compact_all(&self) -> Result<CompactionStats> {
        let mut total = CompactionStats::default();
        loop {
            let stats = self.compact_batch()?;
            if stats.batches == 0 {
                total.remaining = self.state.tombstones.len();
                return Ok(total);
            }
            total.absorb(&stats);
            if stats.remaining == 0 {
                return Ok(total);
            }
        }
    }
}

/// Messages accepted by the compaction worker.
#[derive(Debug)]
pub(crate) enum CompactionMessage {
    /// A node was tombstoned.
    Tombstoned(InternalId),
    /// Compact everything now and report back.
    RunNow(Sender<Result<CompactionStats>>),
    /// Exit the loop.
    Shutdown,
}

/// Handle to the background compaction thread.
#[derive(Debug)]
pub(crate) struct CompactionWorker {
    tx: Sender<CompactionMessage>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionWorker {
    /// Spawns the worker over an existing channel.
    pub(crate) fn spawn(
        engine: Arc<Engine>,
        tx: Sender<CompactionMessage>,
        rx: Receiver<CompactionMessage>,
    ) -> Result<Self> {
        let handle = std::thread::Builder::new()
            .name("tessera-compaction".to_string())
            .spawn(move || run_loop(&engine, &rx))
            .map_err(|e| Error::Internal(format!("failed to spawn compaction thread: {e}")))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Runs a full compaction on the worker thread and waits for it.
    pub(crate) fn run_now(&self) -> Result<CompactionStats> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(CompactionMessage::RunNow(reply_tx))
            .map_err(|_| Error::Internal("compaction worker is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::Internal("compaction worker dropped the request".to_string()))?
    }

    /// Stops the thread and waits for it.
    pub(crate) fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(CompactionMessage::Shutdown);
            if handle.join().is_err() {
                warn!("Compaction worker panicked");
            }
        }
    }
}

impl Drop for CompactionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(engine: &Engine, rx: &Receiver<CompactionMessage>) {
    let config = &engine.config.compaction;
    let interval = Duration::from_secs(config.interval_secs);
    let threshold = config.tombstone_threshold.max(1) as u64;
    debug!(
        pending = engine.state.tombstones.len(),
        "Compaction worker started"
    );

    loop {
        let message = if interval.is_zero() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(interval)
        };

        let due = match message {
            Ok(CompactionMessage::Tombstoned(_)) => engine.state.tombstones.len() >= threshold,
            Ok(CompactionMessage::RunNow(reply)) => {
                let _ = reply.send(engine.compact_all());
                false
            }
            Err(RecvTimeoutError::Timeout) => !engine.state.tombstones.is_empty(),
            Ok(CompactionMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        };

        if due {
            if let Err(e) = engine.compact_all() {
                warn!(error = %e, "Background compaction failed");
            }
        }
    }
    debug!("Compaction worker stopped");
}
