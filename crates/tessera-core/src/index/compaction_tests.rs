//! Tests for `compaction` module

use super::{HnswIndex, IndexOptions, SearchRequest};
use crate::config::TesseraConfig;
use crate::distance::DistanceMetric;
use crate::error::Error;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uuid::Uuid;

fn config() -> TesseraConfig {
    let mut config = TesseraConfig::default();
    config.wal.fsync = false;
    config.snapshot.interval_secs = 0;
    config.snapshot.wal_bytes_threshold = 0;
    config.compaction.enabled = false;
    config.hnsw.seed = Some(3);
    config
}

fn filled(dir: &TempDir, config: TesseraConfig, count: usize) -> HnswIndex {
    let index = HnswIndex::create(
        dir.path(),
        IndexOptions::new(2, DistanceMetric::Euclidean),
        config,
    )
    .unwrap();
    for i in 0..count {
        let angle = i as f32 * 0.1;
        index
            .insert(&[angle.cos() * (1.0 + i as f32), angle.sin()], Uuid::new_v4())
            .unwrap();
    }
    index
}

#[test]
fn test_compact_without_tombstones_does_nothing() {
    let dir = TempDir::new().unwrap();
    let index = filled(&dir, config(), 10);

    let stats = index.compact().unwrap();

    assert_eq!(stats.removed, 0);
    assert_eq!(stats.batches, 0);
    assert_eq!(index.stats().last_sequence, 10);
}

#[test]
fn test_compact_removes_every_tombstone() {
    let dir = TempDir::new().unwrap();
    let index = filled(&dir, config(), 100);
    for id in (0..100).step_by(4) {
        index.delete(id).unwrap();
    }
    assert_eq!(index.stats().tombstoned, 25);

    let stats = index.compact().unwrap();

    assert_eq!(stats.removed, 25);
    assert_eq!(stats.remaining, 0);
    let after = index.stats();
    assert_eq!(after.tombstoned, 0);
    assert_eq!(after.nodes, 75);
    assert_eq!(after.live, 75);
}

#[test]
fn test_compact_runs_in_batches() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.compaction.batch_size = 4;
    let index = filled(&dir, config, 40);
    for id in 0..10 {
        index.delete(id).unwrap();
    }

    let stats = index.compact().unwrap();

    assert_eq!(stats.removed, 10);
    assert_eq!(stats.batches, 3);
}

#[test]
fn test_compacted_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let index = filled(&dir, config(), 10);
    index.delete(3).unwrap();
    index.compact().unwrap();

    assert!(matches!(index.delete(3), Err(Error::NotFound(3))));
    assert!(index.get(3).is_none());
}

#[test]
fn test_freed_ids_are_reused() {
    let dir = TempDir::new().unwrap();
    let index = filled(&dir, config(), 10);
    index.delete(2).unwrap();
    index.delete(5).unwrap();
    index.compact().unwrap();

    let first = index.insert(&[50.0, 50.0], Uuid::new_v4()).unwrap();
    let second = index.insert(&[51.0, 50.0], Uuid::new_v4()).unwrap();
    let third = index.insert(&[52.0, 50.0], Uuid::new_v4()).unwrap();

    assert_eq!((first, second, third), (2, 5, 10));
}

#[test]
fn test_search_after_compaction_finds_survivors() {
    let dir = TempDir::new().unwrap();
    let index = filled(&dir, config(), 200);
    for id in (0..200).filter(|id| id % 3 == 0) {
        index.delete(id).unwrap();
    }
    index.compact().unwrap();

    for id in (0..200u64).filter(|id| id % 3 != 0) {
        let (_, vector) = index.get(id).expect("survivor");
        let hits = index.search(&vector, &SearchRequest::new(1)).unwrap();
        assert_eq!(hits[0].internal_id, id);
    }
}

#[test]
fn test_worker_compacts_at_threshold() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.compaction.enabled = true;
    config.compaction.tombstone_threshold = 5;
    config.compaction.interval_secs = 0;
    let index = filled(&dir, config, 30);

    for id in 0..5 {
        index.delete(id).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while index.stats().tombstoned > 0 {
        assert!(Instant::now() < deadline, "worker never compacted");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(index.stats().nodes, 25);
}

#[test]
fn test_compact_through_worker() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.compaction.enabled = true;
    config.compaction.tombstone_threshold = 1_000;
    config.compaction.interval_secs = 0;
    let index = filled(&dir, config, 30);
    index.delete(7).unwrap();

    let stats = index.compact().unwrap();

    assert_eq!(stats.removed, 1);
    assert_eq!(index.stats().nodes, 29);
}
