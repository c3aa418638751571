//! # Tessera Core
//!
//! Durable, concurrently mutable HNSW index for approximate nearest-neighbor
//! search over dense `f32` vectors.
//!
//! Tessera is the vector index underneath an object store: each object is a
//! caller-supplied UUID plus one embedding. The index keeps the graph in
//! memory and makes every acknowledged write durable through a write-ahead
//! log, with periodic snapshots bounding recovery time.
//!
//! ## Features
//!
//! - **HNSW graph**: multi-layer proximity graph with heuristic neighbor selection
//! - **3 Distance Metrics**: Cosine, Dot Product, Euclidean (SIMD kernels)
//! - **Write-ahead log**: CRC-framed, segmented, torn-tail tolerant
//! - **Snapshots**: atomic, checksummed, loaded through `mmap`
//! - **Tombstones**: deletes are instant; a background worker repairs the graph
//! - **Concurrent**: searches run lock-free of writers except per-node locks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tessera_core::{DistanceMetric, HnswIndex, IndexOptions, SearchRequest, TesseraConfig};
//! use uuid::Uuid;
//!
//! let index = HnswIndex::create(
//!     "./data/products",
//!     IndexOptions::new(768, DistanceMetric::Cosine),
//!     TesseraConfig::default(),
//! )?;
//!
//! let id = index.insert(&embedding, Uuid::new_v4())?;
//!
//! // Top 10, wider beam, 50ms budget
//! let request = SearchRequest::new(10)
//!     .with_ef(128)
//!     .with_timeout(std::time::Duration::from_millis(50));
//! let hits = index.search(&query, &request)?;
//!
//! index.delete(id)?;
//! index.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// =============================================================================
// NUMERIC CAST LINTS
// =============================================================================
// Prefer local #[allow(...)] on specific functions; these cover the SIMD
// kernels and level arithmetic only.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
// =============================================================================
// STYLISTIC LINTS - Safe to allow globally (no bug risk)
// =============================================================================
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::significant_drop_in_scrutinee)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::manual_let_else)]

pub mod config;
pub mod distance;
pub mod error;
pub mod index;
pub mod simd;
pub mod storage;
pub mod types;

pub use config::{
    CompactionConfig, ConfigError, HnswConfig, LoggingConfig, SearchConfig, SelectionStrategy,
    SnapshotConfig, TesseraConfig, WalConfig,
};
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use index::{
    AllowList, CancelPolicy, CancellationToken, CompactionStats, FixedLevels, HnswIndex,
    IndexOptions, IndexStats, LevelGenerator, Predicate, RecoveryReport, SearchRequest,
    SeededLevelGenerator,
};
pub use storage::Truncation;
pub use types::{EntryPoint, InternalId, SearchHit};
