//! Neighbor selection policies.
//!
//! The heuristic is HNSW algorithm 4 with the VAMANA `alpha` relaxation:
//! a candidate `c` is kept only if it is closer to the base node `q` than
//! to every already kept neighbor `s`, scaled by `alpha`:
//!
//! ```text
//! keep c  iff  d(q, c) < alpha * d(c, s)  for all selected s
//! ```
//!
//! `alpha = 1.0` is the classic rule; larger values keep more long edges.
//! The relaxation assumes non-negative distances, so indexes using the dot
//! metric (negated inner product) are restricted to `alpha = 1.0`; see
//! [`TesseraConfig::validate_for_metric`](crate::config::TesseraConfig::validate_for_metric).

use super::candidate::Candidate;
use crate::config::{HnswConfig, SelectionStrategy};
use crate::distance::DistanceMetric;
use crate::storage::VectorRecord;
use std::sync::Arc;

/// How a node picks its neighbors from a candidate pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NeighborSelection {
    /// Keep the closest candidates.
    Simple,
    /// Diversity heuristic.
    Heuristic {
        /// Relaxation factor, `>= 1.0`.
        alpha: f32,
        /// Widen the pool with the candidates' own neighbors.
        extend_candidates: bool,
        /// Fill remaining slots with the closest rejected candidates.
        keep_pruned: bool,
    },
}

impl Default for NeighborSelection {
    fn default() -> Self {
        Self::Heuristic {
            alpha: 1.0,
            extend_candidates: false,
            keep_pruned: true,
        }
    }
}

impl NeighborSelection {
    /// Builds the policy described by a configuration section.
    #[must_use]
    pub fn from_config(config: &HnswConfig) -> Self {
        match config.selection {
            SelectionStrategy::Simple => Self::Simple,
            SelectionStrategy::Heuristic => Self::Heuristic {
                alpha: config.alpha,
                extend_candidates: config.extend_candidates,
                keep_pruned: config.keep_pruned,
            },
        }
    }

    /// True if the pool should be widened before selecting.
    #[must_use]
    pub const fn extends_candidates(&self) -> bool {
        matches!(
            self,
            Self::Heuristic {
                extend_candidates: true,
                ..
            }
        )
    }

    /// Selects up to `cap` neighbors from `pool`.
    ///
    /// `pool` must be sorted by ascending [`Candidate`] order, with each
    /// candidate's distance measured to the base node. The result keeps
    /// that order.
    #[must_use]
    pub fn select(
        &self,
        metric: DistanceMetric,
        pool: &[(Candidate, Arc<VectorRecord>)],
        cap: usize,
    ) -> Vec<Candidate> {
        if pool.len() <= cap || cap == 0 {
            return pool.iter().take(cap).map(|(c, _)| *c).collect();
        }

        match *self {
            Self::Simple => pool.iter().take(cap).map(|(c, _)| *c).collect(),
            Self::Heuristic {
                alpha, keep_pruned, ..
            } => {
                let mut selected: Vec<usize> = Vec::with_capacity(cap);
                let mut pruned: Vec<usize> = Vec::new();

                for (i, (candidate, record)) in pool.iter().enumerate() {
                    if selected.len() >= cap {
                        break;
                    }
                    let diverse = selected.iter().all(|&s| {
                        let to_selected = metric.distance(record.vector(), pool[s].1.vector());
                        candidate.distance < alpha * to_selected
                    });
                    if diverse {
                        selected.push(i);
                    } else {
                        pruned.push(i);
                    }
                }

                if keep_pruned && selected.len() < cap {
                    let missing = cap - selected.len();
                    selected.extend(pruned.into_iter().take(missing));
                    selected.sort_unstable();
                }

                selected.into_iter().map(|i| pool[i].0).collect()
            }
        }
    }
}
