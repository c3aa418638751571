//! Crash recovery integration tests.
//!
//! A "crash" is simulated by dropping the index without `close()`: the
//! workers stop but no final snapshot is written, so reopening has to replay
//! the WAL exactly as after a process kill.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tessera_core::{
    DistanceMetric, Error, HnswIndex, IndexOptions, SearchHit, SearchRequest, TesseraConfig,
};
use uuid::Uuid;

const DIM: usize = 16;

fn config() -> TesseraConfig {
    let mut config = TesseraConfig::default();
    config.wal.fsync = false;
    config.snapshot.interval_secs = 0;
    config.snapshot.wal_bytes_threshold = 0;
    config.snapshot.on_close = false;
    config.compaction.enabled = false;
    config.hnsw.seed = Some(3);
    config
}

fn create(dir: &Path) -> HnswIndex {
    HnswIndex::create(dir, IndexOptions::new(DIM, DistanceMetric::Euclidean), config()).unwrap()
}

fn vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn top_k(index: &HnswIndex, queries: &[Vec<f32>]) -> Vec<Vec<SearchHit>> {
    queries
        .iter()
        .map(|q| index.search(q, &SearchRequest::new(5).with_ef(64)).unwrap())
        .collect()
}

fn wal_segments(dir: &Path) -> Vec<PathBuf> {
    let mut segments: Vec<PathBuf> = fs::read_dir(dir.join("wal"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "wal"))
        .collect();
    segments.sort();
    segments
}

#[test]
fn test_acknowledged_inserts_survive_crash() {
    let dir = TempDir::new().unwrap();
    let queries = vectors(20, 11);
    let before = {
        let index = create(dir.path());
        for v in vectors(300, 1) {
            index.insert(&v, Uuid::new_v4()).unwrap();
        }
        top_k(&index, &queries)
    };

    let index = HnswIndex::open(dir.path(), config()).unwrap();

    assert_eq!(index.len(), 300);
    assert_eq!(index.recovery_report().snapshot_sequence, 0);
    assert_eq!(index.recovery_report().last_sequence, 300);
    assert_eq!(top_k(&index, &queries), before);
}

#[test]
fn test_deletes_survive_crash() {
    let dir = TempDir::new().unwrap();
    let data = vectors(100, 2);
    {
        let index = create(dir.path());
        for v in &data {
            index.insert(v, Uuid::new_v4()).unwrap();
        }
        for id in (0..100).step_by(3) {
            index.delete(id).unwrap();
        }
    }

    let index = HnswIndex::open(dir.path(), config()).unwrap();

    assert_eq!(index.len(), 66);
    for (id, v) in data.iter().enumerate() {
        let hits = index.search(v, &SearchRequest::new(10)).unwrap();
        assert!(hits.iter().all(|h| h.internal_id % 3 != 0));
        if id % 3 != 0 {
            assert_eq!(hits[0].internal_id, id as u64);
        }
    }
}

#[test]
fn test_recovery_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let queries = vectors(20, 12);
    {
        let index = create(dir.path());
        for v in vectors(200, 3) {
            index.insert(&v, Uuid::new_v4()).unwrap();
        }
        for id in [0, 17, 42, 99] {
            index.delete(id).unwrap();
        }
    }

    let (first_stats, first_hits) = {
        let index = HnswIndex::open(dir.path(), config()).unwrap();
        (index.stats(), top_k(&index, &queries))
    };
    let index = HnswIndex::open(dir.path(), config()).unwrap();

    assert_eq!(index.stats(), first_stats);
    assert_eq!(top_k(&index, &queries), first_hits);
}

#[test]
fn test_snapshot_plus_wal_tail() {
    let dir = TempDir::new().unwrap();
    let data = vectors(120, 4);
    let queries = vectors(10, 13);
    let before = {
        let index = create(dir.path());
        for v in &data[..80] {
            index.insert(v, Uuid::new_v4()).unwrap();
        }
        index.delete(5).unwrap();
        index.compact().unwrap();
        assert_eq!(index.flush().unwrap(), index.stats().last_sequence);
        for v in &data[80..] {
            index.insert(v, Uuid::new_v4()).unwrap();
        }
        index.delete(90).unwrap();
        top_k(&index, &queries)
    };

    let index = HnswIndex::open(dir.path(), config()).unwrap();
    let report = index.recovery_report();

    assert!(report.snapshot_sequence > 81);
    assert!(report.snapshot_path.is_some());
    // 40 inserts, one delete, possibly one entry point election.
    assert!(report.replayed >= 41);
    assert_eq!(
        report.snapshot_sequence + report.replayed as u64,
        report.last_sequence
    );
    assert_eq!(index.len(), 118);
    assert_eq!(top_k(&index, &queries), before);
}

#[test]
fn test_torn_tail_is_truncated() {
    let dir = TempDir::new().unwrap();
    {
        let index = create(dir.path());
        for v in vectors(25, 5) {
            index.insert(&v, Uuid::new_v4()).unwrap();
        }
    }
    let last = wal_segments(dir.path()).pop().unwrap();
    let mut file = OpenOptions::new().append(true).open(&last).unwrap();
    file.write_all(&[0x5A; 7]).unwrap();
    drop(file);

    let index = HnswIndex::open(dir.path(), config()).unwrap();
    let truncation = index.recovery_report().truncated.clone().unwrap();

    assert_eq!(truncation.segment, last);
    assert_eq!(index.len(), 25);
    index.insert(&[0.5; DIM], Uuid::new_v4()).unwrap();
    assert_eq!(index.stats().last_sequence, 26);
}

#[test]
fn test_clean_close_needs_no_replay() {
    let dir = TempDir::new().unwrap();
    let mut closing = config();
    closing.snapshot.on_close = true;
    {
        let index = HnswIndex::create(
            dir.path(),
            IndexOptions::new(DIM, DistanceMetric::Euclidean),
            closing,
        )
        .unwrap();
        for v in vectors(40, 6) {
            index.insert(&v, Uuid::new_v4()).unwrap();
        }
        index.close().unwrap();
    }

    let index = HnswIndex::open(dir.path(), config()).unwrap();

    assert_eq!(index.recovery_report().replayed, 0);
    assert_eq!(index.recovery_report().snapshot_sequence, 40);
    assert_eq!(index.len(), 40);
}

#[test]
fn test_open_rejects_missing_index() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        HnswIndex::open(dir.path().join("nope"), config()),
        Err(Error::IndexMissing(_))
    ));
}

#[test]
fn test_persisted_parameters_win_over_config() {
    let dir = TempDir::new().unwrap();
    {
        let index = create(dir.path());
        index.insert(&[0.1; DIM], Uuid::new_v4()).unwrap();
    }
    let mut other = config();
    other.hnsw.m = 32;

    let index = HnswIndex::open(dir.path(), other).unwrap();

    assert_eq!(index.stats().dimension, DIM);
    assert!(matches!(
        index.insert(&[0.1; 8], Uuid::new_v4()),
        Err(Error::DimensionMismatch { expected: DIM, actual: 8 })
    ));
}

#[test]
fn test_failed_insert_does_not_resurface_after_restart() {
    const WIDE: usize = 1100;
    let dir = TempDir::new().unwrap();
    let mut small_segments = config();
    small_segments.wal.segment_max_bytes = 4096;
    let (a, b, c) = (vec![1.0; WIDE], vec![2.0; WIDE], vec![3.0; WIDE]);
    let (ua, ub, uc) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    {
        let index = HnswIndex::create(
            dir.path(),
            IndexOptions::new(WIDE, DistanceMetric::Euclidean),
            small_segments.clone(),
        )
        .unwrap();
        assert_eq!(index.insert(&a, ua).unwrap(), 0);

        // One record fills the segment; block the file the rollover needs.
        let blocker = dir.path().join("wal").join(format!("{:020}.wal", 2));
        fs::create_dir(&blocker).unwrap();
        let err = index.insert(&b, ub).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.stats().nodes, 1);
        assert_eq!(index.stats().last_sequence, 1);

        fs::remove_dir(&blocker).unwrap();
        assert_eq!(index.insert(&c, uc).unwrap(), 1);
    }

    let index = HnswIndex::open(dir.path(), small_segments).unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.get(0), Some((ua, a)));
    assert_eq!(index.get(1), Some((uc, c)));
    let hits = index.search(&b, &SearchRequest::new(5)).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.external_id != ub));
}
