//! Tests for CLI import module.

use crate::import::{import_jsonl, parse_vector, ImportStats};
use std::io::Write;
use tempfile::tempdir;
use tessera_core::{DistanceMetric, HnswIndex, IndexOptions, TesseraConfig};

fn index(dir: &std::path::Path) -> HnswIndex {
    let mut config = TesseraConfig::default();
    config.wal.fsync = false;
    config.snapshot.interval_secs = 0;
    config.snapshot.wal_bytes_threshold = 0;
    config.compaction.enabled = false;
    HnswIndex::create(dir, IndexOptions::new(3, DistanceMetric::Euclidean), config).unwrap()
}

#[test]
fn test_parse_vector_json_array() {
    assert_eq!(parse_vector("  [ 1.0 , 2.0 , 3.0 ]  ").unwrap(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_parse_vector_comma_separated() {
    assert_eq!(parse_vector("1.0,2.0, 3.0").unwrap(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_parse_vector_invalid() {
    assert!(parse_vector("[1.0, 2.0, invalid]").is_err());
    assert!(parse_vector("1.0, not_a_number, 3.0").is_err());
}

#[test]
fn test_records_per_sec() {
    let stats = ImportStats {
        imported: 500,
        duration_ms: 250,
        ..ImportStats::default()
    };
    assert!((stats.records_per_sec() - 2000.0).abs() < f64::EPSILON);
}

#[test]
fn test_import_jsonl_counts_bad_lines() {
    let dir = tempdir().unwrap();
    let index = index(&dir.path().join("idx"));
    let file_path = dir.path().join("data.jsonl");
    let mut file = std::fs::File::create(&file_path).unwrap();
    writeln!(
        file,
        r#"{{"id": "67e55044-10b1-426f-9247-bb680e5fe0c8", "vector": [1.0, 0.0, 0.0]}}"#
    )
    .unwrap();
    writeln!(file, r#"{{"vector": [0.0, 1.0, 0.0]}}"#).unwrap();
    writeln!(file).unwrap();
    writeln!(file, r#"{{"vector": [0.0, 1.0]}}"#).unwrap();
    writeln!(file, "not json").unwrap();
    drop(file);

    let stats = import_jsonl(&index, &file_path).unwrap();

    assert_eq!(stats.total, 4);
    assert_eq!(stats.imported, 2);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.id_range, Some((0, 1)));
    let (external, _) = index.get(0).unwrap();
    assert_eq!(external.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
}

#[test]
fn test_import_empty_file_fails() {
    let dir = tempdir().unwrap();
    let index = index(&dir.path().join("idx"));
    let file_path = dir.path().join("empty.jsonl");
    std::fs::write(&file_path, "\n\n").unwrap();

    assert!(import_jsonl(&index, &file_path).is_err());
}
