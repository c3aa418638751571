//! Index layer: the HNSW graph plus everything that makes it durable and
//! safe to mutate while it is being searched.
//!
//! # Module Structure
//!
//! - `hnsw` - graph layer (search, insert, repair, selection)
//! - `hnsw_index` - `HnswIndex` facade
//! - `engine` - write and read paths shared with the workers
//! - `state` - in-memory state and the mutations replay reuses
//! - `concurrency` - node state machine, structure gate, reader epochs
//! - `tombstone` - deleted ids awaiting compaction
//! - `compaction` - unlinking tombstones, background worker
//! - `checkpoint` - snapshot capture/restore, background worker
//! - `recovery` - create/open, snapshot + WAL replay
//! - `request` - search requests, filters, cancellation

mod checkpoint;
mod compaction;
pub mod concurrency;
mod engine;
pub mod hnsw;
mod hnsw_index;
mod recovery;
mod request;
mod state;
mod tombstone;

#[cfg(test)]
mod compaction_tests;
#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod tombstone_tests;

pub use compaction::CompactionStats;
pub use concurrency::{EpochPin, NodeState, ReaderEpochs, StructureGate};
pub use hnsw::{FixedLevels, HnswGraph, HnswParams, LevelGenerator, SeededLevelGenerator};
pub use hnsw_index::{HnswIndex, IndexOptions, IndexStats, CONFIG_FILE};
pub use recovery::RecoveryReport;
pub use request::{AllowList, CancelPolicy, CancellationToken, Predicate, SearchRequest};
pub use state::IndexState;
pub use tombstone::TombstoneSet;
