//! Tests for `snapshot` module

use super::snapshot::{
    decode, encode, list_snapshots, load_latest, prune, write, SnapshotAllocator, SnapshotBody,
    SnapshotHeader, SnapshotNode, SnapshotRecord,
};
use crate::distance::DistanceMetric;
use crate::error::Error;
use crate::types::EntryPoint;
use std::fs;
use tempfile::TempDir;
use uuid::Uuid;

fn body(last_seq: u64) -> SnapshotBody {
    let records = (0..3u64)
        .map(|id| SnapshotRecord {
            internal_id: id,
            external_id: Uuid::from_u128(u128::from(id)),
            vector: vec![id as f32, 0.0],
            deleted: id == 1,
        })
        .collect::<Vec<_>>();
    SnapshotBody {
        header: SnapshotHeader {
            dimension: 2,
            metric: DistanceMetric::Euclidean,
            count: records.len(),
            entry_point: Some(EntryPoint { id: 2, level: 1 }),
            max_level: 16,
            last_seq,
        },
        records,
        nodes: vec![
            SnapshotNode { id: 0, level: 0, neighbors: vec![vec![1, 2]] },
            SnapshotNode { id: 1, level: 0, neighbors: vec![vec![0, 2]] },
            SnapshotNode { id: 2, level: 1, neighbors: vec![vec![0, 1], vec![]] },
        ],
        allocator: SnapshotAllocator { next_id: 4, unused: vec![3] },
    }
}

#[test]
fn test_encode_decode_preserves_body() {
    let original = body(7);
    let decoded = decode(&encode(&original).unwrap()).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_decode_rejects_bad_magic() {
    let mut bytes = encode(&body(1)).unwrap();
    bytes[0] = b'X';
    assert!(matches!(decode(&bytes), Err(Error::CorruptSnapshot(_))));
}

#[test]
fn test_decode_rejects_unknown_version() {
    let mut bytes = encode(&body(1)).unwrap();
    bytes[4] = 99;
    let err = decode(&bytes).unwrap_err();
    assert!(err.to_string().contains("version"));
}

#[test]
fn test_decode_rejects_flipped_body_byte() {
    let mut bytes = encode(&body(1)).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x55;
    assert!(matches!(decode(&bytes), Err(Error::CorruptSnapshot(_))));
}

#[test]
fn test_decode_rejects_truncation() {
    let bytes = encode(&body(1)).unwrap();
    assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    assert!(decode(&bytes[..6]).is_err());
}

#[test]
fn test_write_names_file_by_sequence() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), &body(42)).unwrap();
    assert_eq!(path.file_name().unwrap(), "00000000000000000042.snap");
    assert_eq!(list_snapshots(dir.path()).unwrap().len(), 1);
}

#[test]
fn test_load_latest_prefers_newest_valid() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), &body(5)).unwrap();
    let newest = write(dir.path(), &body(9)).unwrap();

    let (path, loaded) = load_latest(dir.path()).unwrap().expect("snapshot");
    assert_eq!(path, newest);
    assert_eq!(loaded.header.last_seq, 9);

    // Damage the newest; the older one must be used.
    let mut bytes = fs::read(&newest).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&newest, bytes).unwrap();

    let (_, loaded) = load_latest(dir.path()).unwrap().expect("fallback snapshot");
    assert_eq!(loaded.header.last_seq, 5);
}

#[test]
fn test_load_latest_on_empty_dir() {
    let dir = TempDir::new().unwrap();
    assert!(load_latest(dir.path()).unwrap().is_none());
    assert!(load_latest(&dir.path().join("missing")).unwrap().is_none());
}

#[test]
fn test_prune_keeps_newest() {
    let dir = TempDir::new().unwrap();
    for seq in [1, 2, 3, 4] {
        write(dir.path(), &body(seq)).unwrap();
    }
    fs::write(dir.path().join("00000000000000000005.snap.tmp"), b"partial").unwrap();

    assert_eq!(prune(dir.path(), 2).unwrap(), 2);
    let remaining: Vec<u64> = list_snapshots(dir.path())
        .unwrap()
        .into_iter()
        .map(|(seq, _)| seq)
        .collect();
    assert_eq!(remaining, vec![3, 4]);
    assert!(!dir.path().join("00000000000000000005.snap.tmp").exists());
}
