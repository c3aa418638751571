//! Snapshots of the live index and the worker that schedules them.
//!
//! Capture runs with the structure gate held exclusively: the WAL is rotated
//! and the state copied at a single sequence number. Encoding and the file
//! write happen after the gate is released, so writers only wait for the
//! copy.

use super::concurrency::NodeState;
use super::engine::Engine;
use super::hnsw::{GraphNode, HnswGraph, HnswParams};
use super::state::IndexState;
use crate::error::{Error, Result};
use crate::storage::snapshot::{
    self, SnapshotAllocator, SnapshotBody, SnapshotHeader, SnapshotNode, SnapshotRecord,
};
use crate::storage::{IdAllocator, IndexMeta, VectorRecord, SNAPSHOT_DIR};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Copies the state into a snapshot body. Writers must be excluded.
pub(crate) fn capture(state: &IndexState, meta: &IndexMeta, last_seq: u64) -> SnapshotBody {
    let graph = state.graph();
    let records: Vec<SnapshotRecord> = graph
        .store()
        .records()
        .iter()
        .map(|r| SnapshotRecord {
            internal_id: r.internal_id(),
            external_id: r.external_id(),
            vector: r.vector().to_vec(),
            deleted: r.is_deleted(),
        })
        .collect();
    let nodes: Vec<SnapshotNode> = graph
        .nodes_sorted()
        .iter()
        .map(|n| SnapshotNode {
            id: n.id(),
            level: n.level(),
            neighbors: (0..=usize::from(n.level()))
                .map(|l| n.neighbors(l))
                .collect(),
        })
        .collect();

    SnapshotBody {
        header: SnapshotHeader {
            dimension: meta.dimension,
            metric: meta.metric,
            count: records.len(),
            entry_point: graph.entry_point(),
            max_level: meta.max_level,
            last_seq,
        },
        records,
        nodes,
        allocator: SnapshotAllocator {
            next_id: state.ids.next_id(),
            unused: state.ids.unused_ids(),
        },
    }
}

/// Rebuilds the in-memory state from a snapshot body.
///
/// # Errors
///
/// Returns [`Error::CorruptSnapshot`] if the body disagrees with `index.json`
/// or is internally inconsistent.
pub(crate) fn restore(body: SnapshotBody, meta: &IndexMeta, params: HnswParams) -> Result<IndexState> {
    let header = &body.header;
    if header.dimension != meta.dimension || header.metric != meta.metric {
        return Err(Error::CorruptSnapshot(format!(
            "snapshot is {}-d {}, index is {}-d {}",
            header.dimension, header.metric, meta.dimension, meta.metric
        )));
    }

    let graph = HnswGraph::new(meta.dimension, meta.metric, params);
    let mut deleted = Vec::new();
    for record in body.records {
        if record.vector.len() != meta.dimension {
            return Err(Error::CorruptSnapshot(format!(
                "record {} has {} components",
                record.internal_id,
                record.vector.len()
            )));
        }
        if record.deleted {
            deleted.push(record.internal_id);
        }
        let restored = VectorRecord::new(record.internal_id, record.external_id, record.vector);
        if !graph.store().put_restored(restored, record.deleted) {
            return Err(Error::CorruptSnapshot(format!(
                "duplicate record {}",
                record.internal_id
            )));
        }
    }

    for node in body.nodes {
        if node.neighbors.len() != usize::from(node.level) + 1 {
            return Err(Error::CorruptSnapshot(format!(
                "node {} on level {} has {} neighbor lists",
                node.id,
                node.level,
                node.neighbors.len()
            )));
        }
        let record = graph.store().get(node.id).ok_or_else(|| {
            Error::CorruptSnapshot(format!("node {} has no vector record", node.id))
        })?;
        let state = if record.is_deleted() {
            NodeState::Tombstoned
        } else {
            NodeState::Live
        };
        let restored = Arc::new(GraphNode::with_state(node.id, node.level, state));
        for (level, ids) in node.neighbors.into_iter().enumerate() {
            restored.set_neighbors(level, ids);
        }
        if !graph.publish(restored) {
            return Err(Error::CorruptSnapshot(format!("duplicate node {}", node.id)));
        }
    }
    if graph.len() != graph.store().len() {
        return Err(Error::CorruptSnapshot(format!(
            "{} records but {} graph nodes",
            graph.store().len(),
            graph.len()
        )));
    }
    graph.restore_entry(header.entry_point);

    let ids = IdAllocator::restore(body.allocator.next_id, body.allocator.unused);
    let state = IndexState::new(graph, ids);
    for id in deleted {
        state.tombstones.insert(id);
    }
    Ok(state)
}

impl Engine {
    /// Writes a snapshot unless the newest one already covers the log.
    /// Returns the covered sequence number.
    pub(crate) fn snapshot(&self) -> Result<u64> {
        let _writer = self.snapshot_lock.lock();
        let body = {
            let _gate = self.state.gate.exclusive();
            let last_seq = self.wal.last_seq();
            if last_seq == self.last_snapshot_seq.load(Ordering::Acquire) {
                debug!(last_seq, "Snapshot skipped, nothing new");
                return Ok(last_seq);
            }
            self.wal.rotate()?;
            self.wal.reset_checkpoint_bytes();
            capture(&self.state, &self.meta, last_seq)
        };

        let seq = body.header.last_seq;
        let dir = self.dir.join(SNAPSHOT_DIR);
        snapshot::write(&dir, &body)?;
        self.last_snapshot_seq.store(seq, Ordering::Release);

        self.wal.remove_segments_through(seq)?;
        snapshot::prune(&dir, self.config.snapshot.retain)?;
        Ok(seq)
    }
}

/// Messages accepted by the snapshot worker.
#[derive(Debug)]
pub(crate) enum SnapshotMessage {
    /// Enough WAL accumulated.
    Trigger,
    /// Exit the loop.
    Shutdown,
}

/// Handle to the background snapshot thread.
#[derive(Debug)]
pub(crate) struct SnapshotWorker {
    tx: Sender<SnapshotMessage>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWorker {
    /// Spawns the worker over an existing channel.
    pub(crate) fn spawn(
        engine: Arc<Engine>,
        tx: Sender<SnapshotMessage>,
        rx: Receiver<SnapshotMessage>,
    ) -> Result<Self> {
        let handle = std::thread::Builder::new()
            .name("tessera-snapshot".to_string())
            .spawn(move || run_loop(&engine, &rx))
            .map_err(|e| Error::Internal(format!("failed to spawn snapshot thread: {e}")))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it.
    pub(crate) fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            // The channel is bounded; a blocking send still gets through
            // once the worker drains a pending trigger.
            let _ = self.tx.send(SnapshotMessage::Shutdown);
            if handle.join().is_err() {
                warn!("Snapshot worker panicked");
            }
        }
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(engine: &Engine, rx: &Receiver<SnapshotMessage>) {
    let interval = Duration::from_secs(engine.config.snapshot.interval_secs);
    debug!(interval_secs = interval.as_secs(), "Snapshot worker started");
    loop {
        let message = if interval.is_zero() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(interval)
        };
        match message {
            Ok(SnapshotMessage::Trigger) | Err(RecvTimeoutError::Timeout) => {
                if let Err(e) = engine.snapshot() {
                    warn!(error = %e, "Background snapshot failed");
                }
            }
            Ok(SnapshotMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Snapshot worker stopped");
}
