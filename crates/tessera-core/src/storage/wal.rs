//! Segmented write-ahead log.
//!
//! Every mutation is framed, appended and (optionally) `fdatasync`ed before
//! it is applied in memory, so an acknowledged operation survives a crash.
//!
//! # Layout
//!
//! ```text
//! <index>/wal/
//! ├── 00000000000000000001.wal   # records with seq >= 1
//! ├── 00000000000000004097.wal   # records with seq >= 4097 (active)
//! ```
//!
//! # Record Framing
//!
//! ```text
//! [Length: u32 LE][CRC32 of payload: u32 LE][Payload: bincode(WalRecord)]
//! ```
//!
//! A torn or unparsable record ends replay: the segment is truncated at that
//! offset and later segments are set aside. A sequence gap between two valid
//! records is reported as [`Error::CorruptWal`] instead, since silently
//! continuing would drop acknowledged operations.

use super::sync_dir;
use crate::config::WalConfig;
use crate::error::{Error, Result};
use crate::types::{EntryPoint, InternalId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SEGMENT_EXT: &str = "wal";
const ORPHAN_EXT: &str = "orphan";
const FRAME_HEADER: usize = 8;
/// Upper bound on a single encoded record; larger lengths are treated as a torn frame.
const MAX_RECORD_BYTES: usize = 256 * 1024 * 1024;

/// A logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalOp {
    /// A node was inserted with an explicit id and level.
    Insert {
        /// Assigned internal id.
        internal_id: InternalId,
        /// Caller-supplied object id.
        external_id: Uuid,
        /// Randomly drawn level.
        level: u8,
        /// Prepared vector.
        vector: Vec<f32>,
    },
    /// A node was tombstoned.
    Delete {
        /// Tombstoned id.
        internal_id: InternalId,
    },
    /// The entry point was re-elected.
    SetEntryPoint {
        /// New entry point, `None` once no live node remains.
        entry: Option<EntryPoint>,
    },
    /// Tombstoned nodes were unlinked and freed.
    Compact {
        /// Freed ids, ascending.
        ids: Vec<InternalId>,
    },
}

/// A sequenced WAL entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Strictly increasing, gap-free sequence number.
    pub seq: u64,
    /// The mutation.
    pub op: WalOp,
}

/// Encodes a record into its on-disk frame.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails.
pub fn encode_frame(record: &WalRecord) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Serialization("WAL record exceeds 4 GiB".to_string()))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Outcome of decoding one frame from a buffer.
#[derive(Debug)]
pub(crate) enum Frame {
    /// A valid record and the number of bytes it occupied.
    Record(WalRecord, usize),
    /// Clean end of buffer.
    End,
    /// Torn, checksum-failing or unparsable bytes.
    Torn(String),
}

pub(crate) fn decode_frame(buf: &[u8]) -> Frame {
    if buf.is_empty() {
        return Frame::End;
    }
    if buf.len() < FRAME_HEADER {
        return Frame::Torn(format!("{} trailing bytes, header incomplete", buf.len()));
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let crc = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if len == 0 || len > MAX_RECORD_BYTES {
        return Frame::Torn(format!("implausible record length {len}"));
    }
    let Some(payload) = buf.get(FRAME_HEADER..FRAME_HEADER + len) else {
        return Frame::Torn(format!(
            "record needs {len} bytes, {} available",
            buf.len() - FRAME_HEADER
        ));
    };
    if crc32fast::hash(payload) != crc {
        return Frame::Torn("checksum mismatch".to_string());
    }
    match bincode::deserialize::<WalRecord>(payload) {
        Ok(record) => Frame::Record(record, FRAME_HEADER + len),
        Err(e) => Frame::Torn(format!("undecodable record: {e}")),
    }
}

fn segment_path(dir: &Path, start_seq: u64) -> PathBuf {
    dir.join(format!("{start_seq:020}.{SEGMENT_EXT}"))
}

/// Lists WAL segments as `(start_seq, path)`, ascending.
pub(crate) fn list_segments(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
            continue;
        }
        if let Some(seq) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            segments.push((seq, path));
        }
    }
    segments.sort_unstable_by_key(|(seq, _)| *seq);
    Ok(segments)
}

/// Where replay stopped because of a torn record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Segment that was cut.
    pub segment: PathBuf,
    /// New length of that segment.
    pub offset: u64,
    /// What was wrong with the discarded bytes.
    pub reason: String,
    /// Later segments renamed to `*.orphan` and not replayed.
    pub orphaned: Vec<PathBuf>,
}

/// Summary of a WAL replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Highest sequence number known durable (snapshot or WAL).
    pub last_seq: u64,
    /// Records applied (those after the snapshot).
    pub replayed: usize,
    /// Records skipped because the snapshot already covers them.
    pub skipped: usize,
    /// Set when a torn tail was cut off.
    pub truncation: Option<Truncation>,
}

/// Replays every record with `seq > after_seq` in order.
///
/// # Errors
///
/// - [`Error::CorruptWal`] on a sequence gap between valid records
/// - [`Error::Io`] if a segment cannot be read or truncated
/// - any error returned by `apply`
pub fn replay<F>(dir: &Path, after_seq: u64, mut apply: F) -> Result<ReplayOutcome>
where
    F: FnMut(WalRecord) -> Result<()>,
{
    let segments = list_segments(dir)?;
    let mut outcome = ReplayOutcome {
        last_seq: after_seq,
        ..ReplayOutcome::default()
    };
    let mut prev_seq: Option<u64> = None;

    for (index, (_, path)) in segments.iter().enumerate() {
        let data = fs::read(path)?;
        let mut offset = 0usize;

        loop {
            match decode_frame(&data[offset..]) {
                Frame::End => break,
                Frame::Record(record, used) => {
                    // The first record may precede the snapshot but must not
                    // leave a hole after it.
                    let expected = match prev_seq {
                        Some(prev) => Some(prev.wrapping_add(1)),
                        None if record.seq > after_seq.saturating_add(1) => {
                            Some(after_seq + 1)
                        }
                        None => None,
                    };
                    if let Some(expected) = expected.filter(|&e| e != record.seq) {
                        return Err(Error::CorruptWal {
                            segment: path.clone(),
                            offset: offset as u64,
                            reason: format!(
                                "sequence gap: expected {expected}, found {}",
                                record.seq
                            ),
                        });
                    }
                    prev_seq = Some(record.seq);
                    offset += used;

                    if record.seq <= after_seq {
                        outcome.skipped += 1;
                        continue;
                    }
                    outcome.last_seq = record.seq;
                    outcome.replayed += 1;
                    apply(record)?;
                }
                Frame::Torn(reason) => {
                    warn!(
                        segment = %path.display(),
                        offset,
                        %reason,
                        "WAL replay stopped at torn record; truncating tail"
                    );
                    let file = OpenOptions::new().write(true).open(path)?;
                    file.set_len(offset as u64)?;
                    file.sync_all()?;

                    let mut orphaned = Vec::new();
                    for (_, later) in &segments[index + 1..] {
                        let target = later.with_extension(ORPHAN_EXT);
                        fs::rename(later, &target)?;
                        orphaned.push(target);
                    }
                    if !orphaned.is_empty() {
                        warn!(count = orphaned.len(), "WAL segments after the torn record set aside");
                    }
                    sync_dir(dir)?;

                    outcome.truncation = Some(Truncation {
                        segment: path.clone(),
                        offset: offset as u64,
                        reason,
                        orphaned,
                    });
                    return Ok(outcome);
                }
            }
        }
    }

    Ok(outcome)
}

#[derive(Debug)]
struct ActiveSegment {
    start_seq: u64,
    path: PathBuf,
    file: File,
    len: u64,
    records: u64,
}

impl ActiveSegment {
    fn open(dir: &Path, start_seq: u64) -> Result<Self> {
        let path = segment_path(dir, start_seq);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        sync_dir(dir)?;
        Ok(Self {
            start_seq,
            path,
            file,
            len,
            records: 0,
        })
    }
}

#[derive(Debug)]
struct WalWriter {
    next_seq: u64,
    segment: ActiveSegment,
    /// Set when a partial frame could not be removed from the segment.
    broken: Option<String>,
}

/// Append side of the write-ahead log.
///
/// Appends are serialized by a single mutex that also owns the sequence
/// counter; searches never touch it.
#[derive(Debug)]
pub struct Wal {
    dir: PathBuf,
    fsync: bool,
    segment_max_bytes: u64,
    writer: Mutex<WalWriter>,
    bytes_since_checkpoint: AtomicU64,
    #[cfg(test)]
    fail_after: AtomicU64,
}

impl Wal {
    /// Opens the log for appending records starting at `next_seq`.
    ///
    /// Must be called after [`replay`], which truncates any torn tail.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or segment cannot be created.
    pub fn open(dir: impl AsRef<Path>, config: &WalConfig, next_seq: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let segment = ActiveSegment::open(&dir, next_seq)?;
        debug!(segment = %segment.path.display(), next_seq, "WAL opened");
        Ok(Self {
            dir,
            fsync: config.fsync,
            segment_max_bytes: config.segment_max_bytes,
            writer: Mutex::new(WalWriter {
                next_seq,
                segment,
                broken: None,
            }),
            bytes_since_checkpoint: AtomicU64::new(0),
            #[cfg(test)]
            fail_after: AtomicU64::new(u64::MAX),
        })
    }

    /// Appends one operation and makes it durable. Returns its sequence number.
    ///
    /// A full segment is rolled over before the next frame is written, and
    /// on a failed write the partial frame is cut off. Either way an error
    /// means nothing was logged and the sequence number is not consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the rollover, write or sync fails, or if an
    /// earlier partial frame could not be cut off.
    pub fn append(&self, op: &WalOp) -> Result<u64> {
        let mut writer = self.writer.lock();
        #[cfg(test)]
        self.take_injected_failure()?;
        if let Some(reason) = &writer.broken {
            return Err(Error::Io(io::Error::other(format!(
                "WAL segment {} is unusable: {reason}",
                writer.segment.path.display()
            ))));
        }

        if writer.segment.len >= self.segment_max_bytes {
            let next = writer.next_seq;
            writer.segment = ActiveSegment::open(&self.dir, next)?;
            debug!(next_seq = next, "WAL segment rolled over");
        }

        let seq = writer.next_seq;
        let record = WalRecord {
            seq,
            op: op.clone(),
        };
        let frame = encode_frame(&record)?;

        if let Err(e) = self.write_frame(&mut writer.segment, &frame) {
            let len = writer.segment.len;
            if let Err(cut) = writer.segment.file.set_len(len) {
                warn!(
                    segment = %writer.segment.path.display(),
                    error = %cut,
                    "Failed to cut off partial WAL frame"
                );
                writer.broken = Some(cut.to_string());
            }
            return Err(e);
        }

        writer.segment.len += frame.len() as u64;
        writer.segment.records += 1;
        writer.next_seq += 1;
        self.bytes_since_checkpoint
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(seq)
    }

    /// Makes the `successes + 1`-th append from now fail once without
    /// touching the log.
    #[cfg(test)]
    pub(crate) fn fail_append_after(&self, successes: u64) {
        self.fail_after.store(successes, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn take_injected_failure(&self) -> Result<()> {
        let left = self
            .fail_after
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                u64::MAX => None,
                0 => Some(u64::MAX),
                n => Some(n - 1),
            });
        if left == Ok(0) {
            return Err(Error::Io(io::Error::other("injected WAL append failure")));
        }
        Ok(())
    }

    fn write_frame(&self, segment: &mut ActiveSegment, frame: &[u8]) -> Result<()> {
        segment.file.write_all(frame)?;
        if self.fsync {
            segment.file.sync_data()?;
        }
        Ok(())
    }

    /// Sequence number of the last appended record (0 if none yet).
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.writer.lock().next_seq - 1
    }

    /// Starts a new segment so a snapshot at `last_seq()` covers whole files.
    ///
    /// # Errors
    ///
    /// Returns an error if the new segment cannot be created.
    pub fn rotate(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.segment.records == 0 {
            return Ok(());
        }
        writer.segment.file.sync_data()?;
        let next = writer.next_seq;
        writer.segment = ActiveSegment::open(&self.dir, next)?;
        Ok(())
    }

    /// Deletes segments whose records all have `seq <= covered`.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment cannot be removed.
    pub fn remove_segments_through(&self, covered: u64) -> Result<usize> {
        let active_start = self.writer.lock().segment.start_seq;
        let segments = list_segments(&self.dir)?;
        let mut removed = 0;
        for window in segments.windows(2) {
            let (start, path) = &window[0];
            let (next_start, _) = &window[1];
            if *start < active_start && *next_start <= covered + 1 {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            sync_dir(&self.dir)?;
            info!(removed, covered, "WAL segments covered by snapshot removed");
        }
        Ok(removed)
    }

    /// Bytes appended since the last [`Wal::reset_checkpoint_bytes`].
    #[must_use]
    pub fn bytes_since_checkpoint(&self) -> u64 {
        self.bytes_since_checkpoint.load(Ordering::Relaxed)
    }

    /// Clears the snapshot trigger counter.
    pub fn reset_checkpoint_bytes(&self) {
        self.bytes_since_checkpoint.store(0, Ordering::Relaxed);
    }

    /// Directory holding the segments.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
