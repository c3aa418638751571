//! Small value types shared by storage, graph and the public API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal node identifier, dense and reused after compaction.
pub type InternalId = u64;

/// Top of the graph: the node every search starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Internal id of the entry node.
    pub id: InternalId,
    /// Highest level the entry node lives on.
    pub level: u8,
}

/// A single search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Internal id of the matching node.
    pub internal_id: InternalId,
    /// Caller-supplied object id.
    pub external_id: Uuid,
    /// Distance to the query (lower is closer).
    pub distance: f32,
}
