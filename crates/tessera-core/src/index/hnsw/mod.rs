//! Hierarchical navigable small world graph.
//!
//! # Module Structure
//!
//! - `graph` - node arena, vector store and entry point
//! - `node` - per-node state and neighbor lists
//! - `search` - greedy descent and beam search
//! - `insert` - linking new nodes, pruning full lists
//! - `repair` - unlinking compacted nodes
//! - `select` - neighbor selection policies
//! - `level` - random level assignment
//! - `scratch` - pooled per-query buffers

mod candidate;
mod graph;
mod insert;
mod level;
mod node;
mod params;
mod repair;
mod scratch;
mod search;
mod select;

#[cfg(test)]
mod graph_tests;
#[cfg(test)]
mod select_tests;

pub use candidate::Candidate;
pub use graph::HnswGraph;
pub use level::{FixedLevels, LevelGenerator, SeededLevelGenerator};
pub use node::{GraphNode, NeighborList};
pub use params::HnswParams;
pub use repair::RepairOutcome;
pub use scratch::{ScratchGuard, ScratchPool, SearchScratch, VisitedSet};
pub use search::{Interrupt, SearchOutcome};
pub use select::NeighborSelection;
