//! Graph construction parameters.

use super::select::NeighborSelection;
use crate::config::HnswConfig;
use crate::storage::IndexMeta;

/// Effective parameters of a graph.
///
/// Degree caps and the level cap come from `index.json`; the tunables
/// (`ef_construction`, selection policy) from the runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HnswParams {
    /// Degree cap above level 0.
    pub m: usize,
    /// Degree cap on level 0.
    pub m0: usize,
    /// Beam width while inserting and repairing.
    pub ef_construction: usize,
    /// Level cap.
    pub max_level: u8,
    /// Neighbor selection policy.
    pub selection: NeighborSelection,
}

impl HnswParams {
    /// Builds parameters from frozen metadata and the runtime tunables.
    #[must_use]
    pub fn new(meta: &IndexMeta, config: &HnswConfig) -> Self {
        Self {
            m: meta.m,
            m0: meta.m0,
            ef_construction: config.ef_construction,
            max_level: meta.max_level,
            selection: NeighborSelection::from_config(config),
        }
    }

    /// Parameters straight from a configuration (new indexes, tests).
    #[must_use]
    pub fn from_config(config: &HnswConfig) -> Self {
        Self {
            m: config.m,
            m0: config.effective_m0(),
            ef_construction: config.ef_construction,
            max_level: config.max_level,
            selection: NeighborSelection::from_config(config),
        }
    }

    /// Degree cap at `level`.
    #[must_use]
    pub const fn cap(&self, level: usize) -> usize {
        if level == 0 {
            self.m0
        } else {
            self.m
        }
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::from_config(&HnswConfig::default())
    }
}
