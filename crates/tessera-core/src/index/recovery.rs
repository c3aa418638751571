//! Creating and reopening an index directory.
//!
//! # Recovery
//!
//! 1. Load `index.json` and validate the runtime configuration
//! 2. Restore the newest valid snapshot, if any
//! 3. Replay WAL records with a higher sequence number, cutting a torn tail
//! 4. Re-elect the entry point if replay left a dead one
//!
//! The result is the state as of the last durable WAL record.

use super::checkpoint;
use super::engine::{Engine, WorkerLinks};
use super::hnsw::{HnswGraph, HnswParams, LevelGenerator, SeededLevelGenerator};
use super::state::IndexState;
use crate::config::TesseraConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::storage::meta::FORMAT_VERSION;
use crate::storage::{
    snapshot, wal, IdAllocator, IndexMeta, Truncation, Wal, SNAPSHOT_DIR, WAL_DIR,
};
use crate::types::EntryPoint;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::time::{Duration, Instant};
use tracing::info;

/// What happened while an index was opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    /// Sequence number covered by the restored snapshot (0 without one).
    pub snapshot_sequence: u64,
    /// Snapshot file that was loaded.
    pub snapshot_path: Option<PathBuf>,
    /// WAL records applied on top of the snapshot.
    pub replayed: usize,
    /// WAL records already covered by the snapshot.
    pub skipped: usize,
    /// Torn tail that was cut off, if any.
    pub truncated: Option<Truncation>,
    /// Last durable sequence number after recovery.
    pub last_sequence: u64,
    /// Entry point after recovery.
    pub entry_point: Option<EntryPoint>,
    /// Live objects after recovery.
    pub live: usize,
    /// Tombstones still awaiting compaction.
    pub tombstoned: u64,
    /// Time spent.
    pub duration: Duration,
}

impl Engine {
    /// Initializes a new index directory, then opens it.
    pub(crate) fn create(
        dir: &Path,
        dimension: usize,
        metric: DistanceMetric,
        config: TesseraConfig,
        links: WorkerLinks,
        levels: Option<Box<dyn LevelGenerator>>,
    ) -> Result<(Self, RecoveryReport)> {
        if dimension == 0 {
            return Err(Error::InvalidParameter(
                "dimension must be positive".to_string(),
            ));
        }
        config.validate()?;
        config.validate_for_metric(metric)?;
        if IndexMeta::exists(dir) {
            return Err(Error::IndexExists(dir.to_path_buf()));
        }

        fs::create_dir_all(dir.join(WAL_DIR))?;
        fs::create_dir_all(dir.join(SNAPSHOT_DIR))?;
        let meta = IndexMeta {
            format_version: FORMAT_VERSION,
            dimension,
            metric,
            m: config.hnsw.m,
            m0: config.hnsw.effective_m0(),
            max_level: config.hnsw.max_level,
        };
        meta.store(dir)?;
        info!(
            path = %dir.display(),
            dimension,
            %metric,
            m = meta.m,
            m0 = meta.m0,
            "Index created"
        );

        Self::open(dir, config, links, levels)
    }

    /// Opens an existing index directory and recovers its state.
    pub(crate) fn open(
        dir: &Path,
        config: TesseraConfig,
        links: WorkerLinks,
        levels: Option<Box<dyn LevelGenerator>>,
    ) -> Result<(Self, RecoveryReport)> {
        let started = Instant::now();
        config.validate()?;
        let meta = IndexMeta::load(dir)?;
        config.validate_for_metric(meta.metric)?;
        let params = HnswParams::new(&meta, &config.hnsw);

        let wal_dir = dir.join(WAL_DIR);
        let snapshot_dir = dir.join(SNAPSHOT_DIR);
        fs::create_dir_all(&wal_dir)?;
        fs::create_dir_all(&snapshot_dir)?;

        let mut report = RecoveryReport::default();
        let state = match snapshot::load_latest(&snapshot_dir)? {
            Some((path, body)) => {
                report.snapshot_sequence = body.header.last_seq;
                report.snapshot_path = Some(path);
                checkpoint::restore(body, &meta, params)?
            }
            None => IndexState::new(
                HnswGraph::new(meta.dimension, meta.metric, params),
                IdAllocator::new(),
            ),
        };

        let outcome = wal::replay(&wal_dir, report.snapshot_sequence, |record| {
            state.replay(record)
        })?;
        report.replayed = outcome.replayed;
        report.skipped = outcome.skipped;
        report.truncated = outcome.truncation;
        report.last_sequence = outcome.last_seq;

        let wal = Wal::open(&wal_dir, &config.wal, outcome.last_seq + 1)?;
        let levels = levels.unwrap_or_else(|| {
            // Offsetting by the sequence keeps a fixed seed from replaying
            // the same level stream after every restart.
            let seed = config
                .hnsw
                .seed
                .unwrap_or_else(rand::random)
                .wrapping_add(outcome.last_seq);
            Box::new(SeededLevelGenerator::new(meta.m, meta.max_level, seed))
        });

        let engine = Self {
            dir: dir.to_path_buf(),
            meta,
            config,
            state,
            wal,
            levels,
            links,
            closed: AtomicBool::new(false),
            last_snapshot_seq: AtomicU64::new(report.snapshot_sequence),
            snapshot_lock: Mutex::new(()),
            compaction_lock: Mutex::new(()),
        };
        engine.reelect_entry()?;

        report.last_sequence = engine.wal.last_seq();
        report.entry_point = engine.graph().entry_point();
        report.live = engine.graph().store().live_len();
        report.tombstoned = engine.state.tombstones.len();
        report.duration = started.elapsed();
        info!(
            path = %dir.display(),
            snapshot_sequence = report.snapshot_sequence,
            replayed = report.replayed,
            skipped = report.skipped,
            truncated = report.truncated.is_some(),
            last_sequence = report.last_sequence,
            live = report.live,
            tombstoned = report.tombstoned,
            elapsed_ms = report.duration.as_millis(),
            "Index recovered"
        );
        Ok((engine, report))
    }
}
