//! Point-in-time snapshots of the whole index.
//!
//! A snapshot lets recovery skip replaying the WAL from the beginning: the
//! newest valid snapshot is loaded and only records with a higher sequence
//! number are replayed on top.
//!
//! # File Format
//!
//! ```text
//! [Magic: "TSNP" 4 bytes]
//! [Version: 1 byte]
//! [Body length: u64 LE]
//! [Body: bincode(SnapshotBody)]
//! [CRC32 of everything above: u32 LE]
//! ```
//!
//! Files are named `{last_seq:020}.snap` and written to a temp file first,
//! then renamed into place, so a crash mid-write never leaves a half file
//! under a valid name.

use super::sync_dir;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::types::{EntryPoint, InternalId};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot file magic bytes.
pub(crate) const SNAPSHOT_MAGIC: &[u8; 4] = b"TSNP";

/// Current snapshot format version.
pub(crate) const SNAPSHOT_VERSION: u8 = 1;

const SNAPSHOT_EXT: &str = "snap";
const HEADER_LEN: usize = 4 + 1 + 8;
const CRC_LEN: usize = 4;

/// Index-wide facts captured with the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Number of records (tombstoned included).
    pub count: usize,
    /// Entry point at capture time.
    pub entry_point: Option<EntryPoint>,
    /// Level cap the index was built with.
    pub max_level: u8,
    /// WAL sequence number this snapshot covers up to.
    pub last_seq: u64,
}

/// One stored vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Internal id.
    pub internal_id: InternalId,
    /// Caller-supplied id.
    pub external_id: Uuid,
    /// Prepared vector.
    pub vector: Vec<f32>,
    /// Tombstone flag.
    pub deleted: bool,
}

/// Adjacency of one graph node, `neighbors[level]` for `0..=level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Node id.
    pub id: InternalId,
    /// Top level.
    pub level: u8,
    /// Neighbor ids per level.
    pub neighbors: Vec<Vec<InternalId>>,
}

/// Id allocator state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAllocator {
    /// Next never-used id.
    pub next_id: InternalId,
    /// Ids below `next_id` that are not in use.
    pub unused: Vec<InternalId>,
}

/// Full snapshot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBody {
    /// Index-wide facts.
    pub header: SnapshotHeader,
    /// Stored vectors, ascending by id.
    pub records: Vec<SnapshotRecord>,
    /// Graph adjacency, ascending by id.
    pub nodes: Vec<SnapshotNode>,
    /// Allocator state.
    pub allocator: SnapshotAllocator,
}

fn snapshot_path(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("{seq:020}.{SNAPSHOT_EXT}"))
}

/// Lists snapshot files as `(last_seq, path)`, ascending.
pub fn list_snapshots(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut snapshots = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
            continue;
        }
        if let Some(seq) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            snapshots.push((seq, path));
        }
    }
    snapshots.sort_unstable_by_key(|(seq, _)| *seq);
    Ok(snapshots)
}

/// Serializes a snapshot into its file bytes.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails.
pub fn encode(body: &SnapshotBody) -> Result<Vec<u8>> {
    let payload = bincode::serialize(body)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    buf.extend_from_slice(SNAPSHOT_MAGIC);
    buf.push(SNAPSHOT_VERSION);
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&payload);
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Validates and decodes snapshot file bytes.
///
/// # Errors
///
/// Returns [`Error::CorruptSnapshot`] on bad magic, version, length or checksum.
pub fn decode(data: &[u8]) -> Result<SnapshotBody> {
    if data.len() < HEADER_LEN + CRC_LEN {
        return Err(Error::CorruptSnapshot(format!(
            "file too short ({} bytes)",
            data.len()
        )));
    }
    if &data[0..4] != SNAPSHOT_MAGIC {
        return Err(Error::CorruptSnapshot("invalid magic".to_string()));
    }
    if data[4] != SNAPSHOT_VERSION {
        return Err(Error::CorruptSnapshot(format!(
            "unsupported version {}",
            data[4]
        )));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[5..HEADER_LEN]);
    let body_len = usize::try_from(u64::from_le_bytes(len_bytes))
        .map_err(|_| Error::CorruptSnapshot("body length overflow".to_string()))?;
    let expected_len = HEADER_LEN
        .checked_add(body_len)
        .and_then(|n| n.checked_add(CRC_LEN))
        .ok_or_else(|| Error::CorruptSnapshot("body length overflow".to_string()))?;
    if data.len() != expected_len {
        return Err(Error::CorruptSnapshot(format!(
            "expected {expected_len} bytes, found {}",
            data.len()
        )));
    }

    let crc_offset = HEADER_LEN + body_len;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&data[crc_offset..]);
    if crc32fast::hash(&data[..crc_offset]) != u32::from_le_bytes(crc_bytes) {
        return Err(Error::CorruptSnapshot("checksum mismatch".to_string()));
    }

    let body: SnapshotBody = bincode::deserialize(&data[HEADER_LEN..crc_offset])
        .map_err(|e| Error::CorruptSnapshot(format!("undecodable body: {e}")))?;
    if body.records.len() != body.header.count {
        return Err(Error::CorruptSnapshot(format!(
            "header count {} but {} records",
            body.header.count,
            body.records.len()
        )));
    }
    Ok(body)
}

/// Writes a snapshot atomically. Returns the final path.
///
/// # Errors
///
/// Returns an error if encoding or any file operation fails.
pub fn write(dir: &Path, body: &SnapshotBody) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let bytes = encode(body)?;
    let final_path = snapshot_path(dir, body.header.last_seq);
    let temp_path = final_path.with_extension("snap.tmp");

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, &final_path)?;
    sync_dir(dir)?;

    info!(
        path = %final_path.display(),
        last_seq = body.header.last_seq,
        records = body.records.len(),
        bytes = bytes.len(),
        "Snapshot written"
    );
    Ok(final_path)
}

fn read_file(path: &Path) -> Result<SnapshotBody> {
    let file = File::open(path)?;
    // SAFETY: snapshot files are never modified after the rename that
    // publishes them; the map is dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file)? };
    decode(&mmap)
}

/// Loads the newest snapshot that validates, skipping damaged ones.
///
/// # Errors
///
/// Returns [`Error::Io`] only if the directory cannot be listed.
pub fn load_latest(dir: &Path) -> Result<Option<(PathBuf, SnapshotBody)>> {
    for (_, path) in list_snapshots(dir)?.into_iter().rev() {
        match read_file(&path) {
            Ok(body) => {
                debug!(path = %path.display(), last_seq = body.header.last_seq, "Snapshot loaded");
                return Ok(Some((path, body)));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping invalid snapshot");
            }
        }
    }
    Ok(None)
}

/// Deletes all but the newest `retain` snapshots and stray temp files.
///
/// # Errors
///
/// Returns an error if a file cannot be removed.
pub fn prune(dir: &Path, retain: usize) -> Result<usize> {
    let snapshots = list_snapshots(dir)?;
    let excess = snapshots.len().saturating_sub(retain.max(1));
    let mut removed = 0;
    for (_, path) in snapshots.into_iter().take(excess) {
        fs::remove_file(&path)?;
        removed += 1;
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            fs::remove_file(&path)?;
        }
    }
    if removed > 0 {
        sync_dir(dir)?;
        debug!(removed, "Old snapshots pruned");
    }
    Ok(removed)
}
