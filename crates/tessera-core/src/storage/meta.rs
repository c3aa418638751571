//! `index.json`: the parameters an index was created with.
//!
//! These are fixed for the lifetime of an index and win over whatever the
//! runtime configuration says when the index is reopened.

use super::sync_dir;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the metadata document inside an index directory.
pub const META_FILE: &str = "index.json";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Immutable index parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// On-disk format version.
    pub format_version: u32,
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Max connections per node on levels above 0.
    pub m: usize,
    /// Max connections per node on level 0.
    pub m0: usize,
    /// Level cap.
    pub max_level: u8,
}

impl IndexMeta {
    /// Reads `index.json` from an index directory.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexMissing`] if the file does not exist
    /// - [`Error::Serialization`] if it is not valid metadata
    /// - [`Error::CorruptSnapshot`] if the format version is unknown
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(META_FILE);
        if !path.exists() {
            return Err(Error::IndexMissing(dir.to_path_buf()));
        }
        let meta: Self = serde_json::from_slice(&fs::read(&path)?)?;
        if meta.format_version != FORMAT_VERSION {
            return Err(Error::CorruptSnapshot(format!(
                "unsupported index format version {}",
                meta.format_version
            )));
        }
        Ok(meta)
    }

    /// Writes `index.json` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn store(&self, dir: &Path) -> Result<()> {
        let path = dir.join(META_FILE);
        let temp = dir.join(format!("{META_FILE}.tmp"));
        fs::write(&temp, serde_json::to_vec_pretty(self)?)?;
        fs::File::open(&temp)?.sync_all()?;
        fs::rename(&temp, &path)?;
        sync_dir(dir)?;
        Ok(())
    }

    /// True if `dir` already holds an index.
    #[must_use]
    pub fn exists(dir: &Path) -> bool {
        dir.join(META_FILE).exists()
    }
}
