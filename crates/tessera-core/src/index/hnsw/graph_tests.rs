//! Tests for `graph` module

use super::graph::HnswGraph;
use super::node::GraphNode;
use super::params::HnswParams;
use super::scratch::ScratchPool;
use super::search::Interrupt;
use super::select::NeighborSelection;
use crate::distance::DistanceMetric;
use crate::index::concurrency::NodeState;
use crate::index::request::{CancellationToken, Predicate};
use crate::storage::VectorRecord;
use crate::types::EntryPoint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use uuid::Uuid;

fn params(m: usize) -> HnswParams {
    HnswParams {
        m,
        m0: 2 * m,
        ef_construction: 64,
        max_level: 8,
        selection: NeighborSelection::default(),
    }
}

fn graph(dimension: usize) -> HnswGraph {
    HnswGraph::new(dimension, DistanceMetric::Euclidean, params(8))
}

fn insert(graph: &HnswGraph, pool: &ScratchPool, id: u64, level: u8, vector: Vec<f32>) {
    let record = VectorRecord::new(id, Uuid::from_u128(u128::from(id)), vector.clone());
    assert!(graph.store().put(record));
    let node = Arc::new(GraphNode::new(id, level));
    assert!(graph.publish(Arc::clone(&node)));
    graph.link(&node, &vector, &mut pool.acquire());
}

fn tombstone(graph: &HnswGraph, id: u64) {
    let node = graph.node(id).expect("node");
    assert!(node.transition(NodeState::Live, NodeState::Tombstoned));
    graph.store().mark_deleted(id).expect("mark deleted");
}

fn search(
    graph: &HnswGraph,
    pool: &ScratchPool,
    query: &[f32],
    k: usize,
    ef: usize,
    filter: Option<&dyn Predicate>,
) -> Vec<u64> {
    let outcome = graph.search(
        query,
        k,
        ef,
        filter,
        &mut pool.acquire(),
        &mut Interrupt::never(),
    );
    assert!(!outcome.interrupted);
    outcome.hits.iter().map(|c| c.id).collect()
}

/// 10x10 grid, ids row-major, levels drawn from a seeded rng.
fn grid() -> (HnswGraph, ScratchPool) {
    let graph = graph(2);
    let pool = ScratchPool::default();
    let mut rng = StdRng::seed_from_u64(11);
    for id in 0..100u64 {
        let level = if rng.gen_bool(0.1) { 1 } else { 0 };
        let vector = vec![(id % 10) as f32, (id / 10) as f32];
        insert(&graph, &pool, id, level, vector);
    }
    (graph, pool)
}

#[test]
fn test_first_insert_becomes_entry_point() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    assert_eq!(graph.entry_point(), None);

    insert(&graph, &pool, 0, 2, vec![0.0, 0.0]);

    assert_eq!(graph.entry_point(), Some(EntryPoint { id: 0, level: 2 }));
}

#[test]
fn test_higher_level_insert_takes_entry_point() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    insert(&graph, &pool, 0, 1, vec![0.0, 0.0]);
    insert(&graph, &pool, 1, 1, vec![1.0, 0.0]);
    assert_eq!(graph.entry_point().map(|e| e.id), Some(0));

    insert(&graph, &pool, 2, 3, vec![2.0, 0.0]);

    assert_eq!(graph.entry_point(), Some(EntryPoint { id: 2, level: 3 }));
    assert_eq!(graph.max_level(), 3);
}

#[test]
fn test_apply_entry_none_only_clears_dead_entry() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    insert(&graph, &pool, 0, 0, vec![0.0, 0.0]);

    graph.apply_entry(None);
    assert_eq!(graph.entry_point().map(|e| e.id), Some(0));

    tombstone(&graph, 0);
    graph.apply_entry(None);
    assert_eq!(graph.entry_point(), None);
}

#[test]
fn test_dead_candidate_never_becomes_entry_point() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    insert(&graph, &pool, 0, 0, vec![0.0, 0.0]);
    insert(&graph, &pool, 1, 0, vec![1.0, 0.0]);
    tombstone(&graph, 1);

    graph.apply_entry(Some(EntryPoint { id: 1, level: 5 }));

    assert_eq!(graph.entry_point().map(|e| e.id), Some(0));
}

#[test]
fn test_elect_entry_prefers_level_then_lowest_id() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    insert(&graph, &pool, 0, 3, vec![0.0, 0.0]);
    insert(&graph, &pool, 1, 2, vec![1.0, 0.0]);
    insert(&graph, &pool, 2, 2, vec![2.0, 0.0]);
    insert(&graph, &pool, 3, 0, vec![3.0, 0.0]);

    assert_eq!(graph.elect_entry(), Some(EntryPoint { id: 0, level: 3 }));
    tombstone(&graph, 0);
    assert_eq!(graph.elect_entry(), Some(EntryPoint { id: 1, level: 2 }));
}

#[test]
fn test_search_empty_graph() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    assert!(search(&graph, &pool, &[0.0, 0.0], 5, 16, None).is_empty());
}

#[test]
fn test_every_grid_point_finds_itself() {
    let (graph, pool) = grid();
    for id in 0..100u64 {
        let query = [(id % 10) as f32, (id / 10) as f32];
        assert_eq!(search(&graph, &pool, &query, 1, 32, None), vec![id]);
    }
}

#[test]
fn test_results_sorted_and_ef_raised_to_k() {
    let (graph, pool) = grid();
    let outcome = graph.search(
        &[4.2, 4.4],
        10,
        1,
        None,
        &mut pool.acquire(),
        &mut Interrupt::never(),
    );
    assert_eq!(outcome.hits.len(), 10);
    assert!(outcome.hits.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(outcome.hits[0].id, 44);
}

#[test]
fn test_equal_distances_ordered_by_id() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    for id in 0..3u64 {
        insert(&graph, &pool, id, 0, vec![1.0, 1.0]);
    }
    for id in 3..10u64 {
        insert(&graph, &pool, id, 0, vec![id as f32, 5.0]);
    }

    assert_eq!(search(&graph, &pool, &[1.0, 1.0], 3, 16, None), vec![0, 1, 2]);
}

#[test]
fn test_tombstoned_nodes_are_skipped_but_traversed() {
    let (graph, pool) = grid();
    for id in (0..100u64).filter(|id| id % 2 == 1) {
        tombstone(&graph, id);
    }

    for id in (0..100u64).filter(|id| id % 2 == 0) {
        let query = [(id % 10) as f32, (id / 10) as f32];
        let hits = search(&graph, &pool, &query, 5, 64, None);
        assert_eq!(hits.first(), Some(&id));
        assert!(hits.iter().all(|h| h % 2 == 0), "tombstone in {hits:?}");
    }
}

#[test]
fn test_filter_restricts_results() {
    let (graph, pool) = grid();
    let only_first_row = |id: &Uuid| id.as_u128() < 10;

    let hits = search(&graph, &pool, &[5.0, 9.0], 3, 100, Some(&only_first_row as &dyn Predicate));

    assert_eq!(hits, vec![5, 4, 6]);
}

#[test]
fn test_cancelled_search_reports_interruption() {
    let graph = graph(2);
    let pool = ScratchPool::default();
    for id in 0..50u64 {
        insert(&graph, &pool, id, 0, vec![id as f32, 0.0]);
    }
    let token = CancellationToken::new();
    token.cancel();
    let mut interrupt = Interrupt::new(None, Some(&token), 1);

    let outcome = graph.search(&[25.0, 0.0], 10, 32, None, &mut pool.acquire(), &mut interrupt);

    assert!(outcome.interrupted);
    assert!(outcome.hits.len() <= 1);
}

#[test]
fn test_degree_caps_and_no_self_loops() {
    let graph = HnswGraph::new(8, DistanceMetric::Euclidean, params(4));
    let pool = ScratchPool::default();
    let mut rng = StdRng::seed_from_u64(5);
    for id in 0..300u64 {
        let level = if rng.gen_bool(0.2) { 1 } else { 0 };
        let vector: Vec<f32> = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();
        insert(&graph, &pool, id, level, vector);
    }

    for node in graph.nodes_sorted() {
        for level in 0..=usize::from(node.level()) {
            let list = node.neighbors(level);
            assert!(list.len() <= graph.params().cap(level));
            assert!(!list.contains(&node.id()));
            for n in &list {
                let neighbor = graph.node(*n).expect("neighbor exists");
                assert!(usize::from(neighbor.level()) >= level);
            }
        }
    }
}

#[test]
fn test_nodes_sorted_and_len() {
    let (graph, _pool) = grid();
    let ids: Vec<u64> = graph.nodes_sorted().iter().map(|n| n.id()).collect();
    assert_eq!(ids, (0..100).collect::<Vec<_>>());
    assert_eq!(graph.len(), 100);
    assert!(!graph.is_empty());
}
