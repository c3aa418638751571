//! Tests for `select` module

use super::candidate::Candidate;
use super::select::NeighborSelection;
use crate::config::{HnswConfig, SelectionStrategy};
use crate::distance::DistanceMetric;
use crate::storage::VectorRecord;
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

const METRIC: DistanceMetric = DistanceMetric::Euclidean;

/// Scores `points` (id = position + 1) against `base`, ascending.
fn pool(base: &[f32], points: &[[f32; 2]]) -> Vec<(Candidate, Arc<VectorRecord>)> {
    let mut pool: Vec<(Candidate, Arc<VectorRecord>)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let id = i as u64 + 1;
            let record = Arc::new(VectorRecord::new(id, Uuid::from_u128(u128::from(id)), p.to_vec()));
            (Candidate::new(id, METRIC.distance(base, p)), record)
        })
        .collect();
    pool.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    pool
}

fn ids(selected: &[Candidate]) -> Vec<u64> {
    selected.iter().map(|c| c.id).collect()
}

fn heuristic(alpha: f32, keep_pruned: bool) -> NeighborSelection {
    NeighborSelection::Heuristic {
        alpha,
        extend_candidates: false,
        keep_pruned,
    }
}

#[test]
fn test_simple_keeps_closest() {
    let pool = pool(&[0.0, 0.0], &[[1.0, 0.0], [1.5, 0.0], [0.0, 2.0]]);
    let selected = NeighborSelection::Simple.select(METRIC, &pool, 2);
    assert_eq!(ids(&selected), vec![1, 2]);
}

#[test]
fn test_heuristic_skips_shadowed_candidate() {
    // (1.5, 0) sits behind (1, 0); (0, 2) opens a new direction.
    let pool = pool(&[0.0, 0.0], &[[1.0, 0.0], [1.5, 0.0], [0.0, 2.0]]);
    let selected = heuristic(1.0, false).select(METRIC, &pool, 2);
    assert_eq!(ids(&selected), vec![1, 3]);
}

#[test]
fn test_keep_pruned_backfills_in_distance_order() {
    let points = [[1.0, 0.0], [1.5, 0.0], [0.0, 2.0], [3.0, 0.0]];
    let pool = pool(&[0.0, 0.0], &points);

    let strict = heuristic(1.0, false).select(METRIC, &pool, 3);
    assert_eq!(ids(&strict), vec![1, 3]);

    let filled = heuristic(1.0, true).select(METRIC, &pool, 3);
    assert_eq!(ids(&filled), vec![1, 2, 3]);
}

#[test]
fn test_alpha_keeps_longer_edges() {
    let points = [[1.0, 0.0], [1.2, 1.2], [-3.0, 0.0]];
    let pool = pool(&[0.0, 0.0], &points);

    let classic = heuristic(1.0, false).select(METRIC, &pool, 2);
    assert_eq!(ids(&classic), vec![1, 3]);

    let relaxed = heuristic(2.0, false).select(METRIC, &pool, 2);
    assert_eq!(ids(&relaxed), vec![1, 2]);
}

#[test]
fn test_small_pool_is_returned_whole() {
    let pool = pool(&[0.0, 0.0], &[[1.0, 0.0], [1.5, 0.0]]);
    let selected = heuristic(1.0, false).select(METRIC, &pool, 8);
    assert_eq!(ids(&selected), vec![1, 2]);
}

#[test]
fn test_zero_cap_selects_nothing() {
    let pool = pool(&[0.0, 0.0], &[[1.0, 0.0]]);
    assert!(NeighborSelection::default().select(METRIC, &pool, 0).is_empty());
}

#[test]
fn test_from_config() {
    let mut config = HnswConfig::default();
    config.selection = SelectionStrategy::Simple;
    assert_eq!(NeighborSelection::from_config(&config), NeighborSelection::Simple);

    config.selection = SelectionStrategy::Heuristic;
    config.extend_candidates = true;
    let policy = NeighborSelection::from_config(&config);
    assert!(policy.extends_candidates());
}

proptest! {
    #[test]
    fn prop_selection_is_sorted_unique_subset(
        points in prop::collection::vec(prop::array::uniform2(-10.0f32..10.0), 1..40),
        cap in 1usize..16,
        keep_pruned in any::<bool>(),
    ) {
        let pool = pool(&[0.0, 0.0], &points);
        let selected = heuristic(1.0, keep_pruned).select(METRIC, &pool, cap);

        prop_assert!(selected.len() <= cap);
        prop_assert!(selected.windows(2).all(|w| w[0] < w[1]));
        let pool_ids: Vec<u64> = pool.iter().map(|(c, _)| c.id).collect();
        prop_assert!(selected.iter().all(|c| pool_ids.contains(&c.id)));
        if keep_pruned {
            prop_assert_eq!(selected.len(), cap.min(pool.len()));
        }
        // The closest candidate always survives.
        prop_assert_eq!(selected.first().map(|c| c.id), pool.first().map(|(c, _)| c.id));
    }
}
