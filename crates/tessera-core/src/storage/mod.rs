//! Durable storage: vectors, ids, write-ahead log and snapshots.
//!
//! An index directory looks like this:
//!
//! ```text
//! <index>/
//! ├── index.json     # immutable parameters
//! ├── wal/           # write-ahead log segments
//! └── snapshots/     # point-in-time images
//! ```

pub mod id_alloc;
pub mod meta;
pub mod snapshot;
pub mod vector_store;
pub mod wal;

#[cfg(test)]
mod snapshot_tests;

pub use id_alloc::IdAllocator;
pub use meta::IndexMeta;
pub use vector_store::{VectorRecord, VectorStore};
pub use wal::{ReplayOutcome, Truncation, Wal, WalOp, WalRecord};

use std::io;
use std::path::Path;

/// Subdirectory holding WAL segments.
pub const WAL_DIR: &str = "wal";
/// Subdirectory holding snapshots.
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Fsyncs a directory so renames and creations inside it are durable.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

/// Directory fsync is not available on this platform; renames are durable
/// once the file itself is synced.
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
