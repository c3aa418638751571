//! Error types for Tessera.
//!
//! A single error enum covers every fallible index operation. Each variant
//! carries a stable `TESS-XXX` code so callers in the object-management layer
//! can map failures without matching on message text.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Tessera operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Vector length differs from the index dimension (TESS-001).
    #[error("[TESS-001] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Index dimension.
        expected: usize,
        /// Length of the rejected vector.
        actual: usize,
    },

    /// Unknown or already compacted internal id (TESS-002).
    #[error("[TESS-002] Node with internal id {0} not found")]
    NotFound(u64),

    /// IO error while reading or writing the WAL or a snapshot (TESS-003).
    #[error("[TESS-003] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A WAL segment could not be replayed without losing acknowledged data (TESS-004).
    #[error("[TESS-004] Corrupt WAL in {segment} at offset {offset}: {reason}")]
    CorruptWal {
        /// Segment file that failed validation.
        segment: PathBuf,
        /// Byte offset of the offending record.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Snapshot file failed validation (TESS-005).
    #[error("[TESS-005] Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Search deadline exceeded or cancellation requested (TESS-006).
    #[error("[TESS-006] Search cancelled before completion")]
    Cancelled,

    /// Vector contains NaN/infinite values or cannot be normalized (TESS-007).
    #[error("[TESS-007] Invalid vector: {0}")]
    InvalidVector(String),

    /// A request parameter is out of range (TESS-008).
    #[error("[TESS-008] Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration could not be loaded or failed validation (TESS-009).
    #[error("[TESS-009] Configuration error: {0}")]
    Config(String),

    /// Encoding or decoding of a persisted structure failed (TESS-010).
    #[error("[TESS-010] Serialization error: {0}")]
    Serialization(String),

    /// An index already lives at the target path (TESS-011).
    #[error("[TESS-011] Index already exists at {0}")]
    IndexExists(PathBuf),

    /// No index lives at the target path (TESS-012).
    #[error("[TESS-012] No index found at {0}")]
    IndexMissing(PathBuf),

    /// The index has been closed (TESS-013).
    #[error("[TESS-013] Index is closed")]
    Closed,

    /// Unexpected internal error (TESS-014). Please report if encountered.
    #[error("[TESS-014] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "TESS-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "TESS-001",
            Self::NotFound(_) => "TESS-002",
            Self::Io(_) => "TESS-003",
            Self::CorruptWal { .. } => "TESS-004",
            Self::CorruptSnapshot(_) => "TESS-005",
            Self::Cancelled => "TESS-006",
            Self::InvalidVector(_) => "TESS-007",
            Self::InvalidParameter(_) => "TESS-008",
            Self::Config(_) => "TESS-009",
            Self::Serialization(_) => "TESS-010",
            Self::IndexExists(_) => "TESS-011",
            Self::IndexMissing(_) => "TESS-012",
            Self::Closed => "TESS-013",
            Self::Internal(_) => "TESS-014",
        }
    }

    /// Returns true if the caller can retry or continue using the index.
    ///
    /// Corruption and internal errors are not recoverable without a rebuild.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::CorruptWal { .. } | Self::CorruptSnapshot(_) | Self::Internal(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
