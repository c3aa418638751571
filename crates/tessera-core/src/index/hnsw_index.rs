//! `HnswIndex`: the public handle to a durable, concurrently mutable index.
//!
//! The handle owns the background workers; everything they share with the
//! caller lives in an `Arc<Engine>`. All methods take `&self`, so an index
//! can be wrapped in an `Arc` and used from many threads at once.

use super::checkpoint::{SnapshotMessage, SnapshotWorker};
use super::compaction::{CompactionMessage, CompactionStats, CompactionWorker};
use super::engine::{Engine, WorkerLinks};
use super::hnsw::LevelGenerator;
use super::recovery::RecoveryReport;
use super::request::SearchRequest;
use crate::config::TesseraConfig;
use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::types::{EntryPoint, InternalId, SearchHit};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Config file looked up inside the index directory by [`HnswIndex::recover`].
pub const CONFIG_FILE: &str = "tessera.toml";

/// Queue depth for tombstone notifications. Overflow is harmless: the
/// worker reads the tombstone count, not the messages.
const COMPACTION_QUEUE: usize = 4096;

/// Creation-time parameters that cannot change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
}

impl IndexOptions {
    /// Options for a `dimension`-d index under `metric`.
    #[must_use]
    pub const fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self { dimension, metric }
    }
}

/// Point-in-time counters of an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Objects visible to search.
    pub live: usize,
    /// Deleted objects still linked into the graph.
    pub tombstoned: u64,
    /// Graph nodes (live and tombstoned).
    pub nodes: usize,
    /// Highest level in the graph.
    pub max_level: u8,
    /// Current entry point.
    pub entry_point: Option<EntryPoint>,
    /// Last WAL sequence number.
    pub last_sequence: u64,
    /// Sequence number covered by the newest snapshot.
    pub last_snapshot_sequence: u64,
    /// WAL bytes written since that snapshot.
    pub wal_bytes_since_snapshot: u64,
    /// Freed ids waiting for readers to drain before reuse.
    pub retired_ids: usize,
}

#[derive(Debug, Default)]
struct Workers {
    compaction: Option<CompactionWorker>,
    snapshot: Option<SnapshotWorker>,
}

/// Receiving ends handed to the workers once the engine exists.
struct PendingWorkers {
    compaction: Option<(Sender<CompactionMessage>, Receiver<CompactionMessage>)>,
    snapshot: Option<(Sender<SnapshotMessage>, Receiver<SnapshotMessage>)>,
}

impl PendingWorkers {
    fn plan(config: &TesseraConfig) -> (Self, WorkerLinks) {
        let compaction = config
            .compaction
            .enabled
            .then(|| bounded(COMPACTION_QUEUE));
        let timed = config.snapshot.interval_secs > 0;
        let sized = config.snapshot.wal_bytes_threshold > 0;
        let snapshot = (timed || sized).then(|| bounded(1));
        let links = WorkerLinks {
            compaction: compaction.as_ref().map(|(tx, _)| tx.clone()),
            snapshot: snapshot.as_ref().map(|(tx, _)| tx.clone()),
        };
        (
            Self {
                compaction,
                snapshot,
            },
            links,
        )
    }

    fn spawn(self, engine: &Arc<Engine>) -> Result<Workers> {
        let mut workers = Workers::default();
        if let Some((tx, rx)) = self.compaction {
            workers.compaction = Some(CompactionWorker::spawn(Arc::clone(engine), tx, rx)?);
        }
        if let Some((tx, rx)) = self.snapshot {
            workers.snapshot = Some(SnapshotWorker::spawn(Arc::clone(engine), tx, rx)?);
        }
        Ok(workers)
    }
}

/// Durable HNSW index over `(external id, vector)` pairs.
///
/// # Example
///
/// ```rust,no_run
/// use tessera_core::{DistanceMetric, HnswIndex, IndexOptions, SearchRequest, TesseraConfig};
/// use uuid::Uuid;
///
/// let index = HnswIndex::create(
///     "./vectors",
///     IndexOptions::new(3, DistanceMetric::Cosine),
///     TesseraConfig::default(),
/// )?;
/// index.insert(&[0.1, 0.2, 0.3], Uuid::new_v4())?;
/// let hits = index.search(&[0.1, 0.2, 0.25], &SearchRequest::new(5))?;
/// index.close()?;
/// # Ok::<(), tessera_core::Error>(())
/// ```
#[derive(Debug)]
pub struct HnswIndex {
    engine: Arc<Engine>,
    workers: Mutex<Workers>,
    report: RecoveryReport,
}

impl HnswIndex {
    /// Creates a new index directory.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexExists`](crate::Error::IndexExists) if `path` already holds an index
    /// - [`Error::Config`](crate::Error::Config) if `config` fails validation
    /// - [`Error::Io`](crate::Error::Io) if the directory cannot be initialized
    pub fn create(
        path: impl AsRef<Path>,
        options: IndexOptions,
        config: TesseraConfig,
    ) -> Result<Self> {
        Self::start(config, |config, links| {
            Engine::create(
                path.as_ref(),
                options.dimension,
                options.metric,
                config,
                links,
                None,
            )
        })
    }

    /// Creates a new index with an explicit level source.
    ///
    /// Used to build reproducible graphs in tests and benchmarks.
    ///
    /// # Errors
    ///
    /// Same as [`HnswIndex::create`].
    pub fn create_with(
        path: impl AsRef<Path>,
        options: IndexOptions,
        config: TesseraConfig,
        levels: Box<dyn LevelGenerator>,
    ) -> Result<Self> {
        Self::start(config, |config, links| {
            Engine::create(
                path.as_ref(),
                options.dimension,
                options.metric,
                config,
                links,
                Some(levels),
            )
        })
    }

    /// Opens an existing index, restoring the newest snapshot and replaying
    /// the WAL on top of it.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexMissing`](crate::Error::IndexMissing) if `path` holds no index
    /// - [`Error::CorruptWal`](crate::Error::CorruptWal) on a sequence gap in the log
    /// - [`Error::Config`](crate::Error::Config) if `config` fails validation
    pub fn open(path: impl AsRef<Path>, config: TesseraConfig) -> Result<Self> {
        Self::start(config, |config, links| {
            Engine::open(path.as_ref(), config, links, None)
        })
    }

    /// Opens an index with the configuration found in its own directory
    /// (`tessera.toml`, then `TESSERA_*` variables, then defaults).
    ///
    /// # Errors
    ///
    /// Same as [`HnswIndex::open`].
    pub fn recover(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = TesseraConfig::load_from_path(path.join(CONFIG_FILE))?;
        Self::open(path, config)
    }

    fn start<F>(config: TesseraConfig, build: F) -> Result<Self>
    where
        F: FnOnce(TesseraConfig, WorkerLinks) -> Result<(Engine, RecoveryReport)>,
    {
        let (pending, links) = PendingWorkers::plan(&config);
        let (engine, report) = build(config, links)?;
        let engine = Arc::new(engine);
        let workers = pending.spawn(&engine)?;
        Ok(Self {
            engine,
            workers: Mutex::new(workers),
            report,
        })
    }

    /// What recovery found when this handle was opened.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.report
    }

    /// Index directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.engine.dir()
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &TesseraConfig {
        &self.engine.config
    }

    /// Inserts a vector and returns its internal id.
    ///
    /// The insert is durable in the WAL before this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`](crate::Error::DimensionMismatch) for a wrong-length vector
    /// - [`Error::InvalidVector`](crate::Error::InvalidVector) for NaN/infinite components, or a
    ///   zero vector under cosine
    /// - [`Error::Io`](crate::Error::Io) if the WAL append fails; nothing is applied
    pub fn insert(&self, vector: &[f32], external_id: Uuid) -> Result<InternalId> {
        self.engine.insert(vector, external_id)
    }

    /// Deletes a node. It disappears from results immediately and is
    /// unlinked by the next compaction. Deleting twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) if `id` was never inserted
    /// or has already been compacted.
    pub fn delete(&self, id: InternalId) -> Result<()> {
        self.engine.delete(id)
    }

    /// Deletes the live node registered for `external_id` and returns its
    /// internal id.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`](crate::Error::InvalidParameter) if no live
    /// node carries that id.
    pub fn delete_external(&self, external_id: &Uuid) -> Result<InternalId> {
        self.engine.delete_external(external_id)
    }

    /// Returns the `k` nearest live neighbors of `query`, closest first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`](crate::Error::InvalidParameter) for `k == 0`,
    ///   `k > max_k` or `ef == 0`
    /// - [`Error::DimensionMismatch`](crate::Error::DimensionMismatch) /
    ///   [`Error::InvalidVector`](crate::Error::InvalidVector) for a bad query
    /// - [`Error::Cancelled`](crate::Error::Cancelled) when interrupted under
    ///   [`CancelPolicy::Fail`](crate::CancelPolicy::Fail)
    pub fn search(&self, query: &[f32], request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.engine.search(query, request)
    }

    /// External id and stored vector of a live node. Cosine indexes return
    /// the normalized vector.
    #[must_use]
    pub fn get(&self, id: InternalId) -> Option<(Uuid, Vec<f32>)> {
        self.engine.get(id)
    }

    /// Writes a snapshot now and returns the sequence number it covers.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn flush(&self) -> Result<u64> {
        self.engine.ensure_open()?;
        self.engine.snapshot()
    }

    /// Compacts every pending tombstone before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if a `Compact` record cannot be logged.
    pub fn compact(&self) -> Result<CompactionStats> {
        self.engine.ensure_open()?;
        let workers = self.workers.lock();
        match &workers.compaction {
            Some(worker) => worker.run_now(),
            None => self.engine.compact_all(),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.engine.stats()
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.graph().store().live_len()
    }

    /// True if no live object is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the workers and, if `snapshot.on_close` is set, writes a final
    /// snapshot. Later calls on this handle fail with
    /// [`Error::Closed`](crate::Error::Closed). Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final snapshot cannot be written. The index is
    /// closed regardless, and the WAL still holds every acknowledged write.
    pub fn close(&self) -> Result<()> {
        if self.engine.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop_workers();
        if self.engine.config.snapshot.on_close {
            self.engine.snapshot()?;
        }
        info!(path = %self.engine.dir().display(), "Index closed");
        Ok(())
    }

    fn stop_workers(&self) {
        let mut workers = self.workers.lock();
        if let Some(mut worker) = workers.compaction.take() {
            worker.shutdown();
        }
        if let Some(mut worker) = workers.snapshot.take() {
            worker.shutdown();
        }
    }
}

impl Drop for HnswIndex {
    fn drop(&mut self) {
        self.stop_workers();
    }
}
