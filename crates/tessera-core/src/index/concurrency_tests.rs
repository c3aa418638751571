//! Tests for `concurrency` module

use super::concurrency::{AtomicNodeState, NodeState, ReaderEpochs, StructureGate};
use std::sync::Arc;
use std::thread;

#[test]
fn test_forward_transitions() {
    let state = AtomicNodeState::new(NodeState::Live);
    assert!(state.transition(NodeState::Live, NodeState::Tombstoned));
    assert!(state.transition(NodeState::Tombstoned, NodeState::Compacting));
    assert!(state.transition(NodeState::Compacting, NodeState::Freed));
    assert_eq!(state.load(), NodeState::Freed);
}

#[test]
fn test_transitions_never_reverse() {
    let state = AtomicNodeState::new(NodeState::Tombstoned);
    assert!(!state.transition(NodeState::Tombstoned, NodeState::Live));
    assert_eq!(state.load(), NodeState::Tombstoned);
}

#[test]
fn test_transition_requires_expected_state() {
    let state = AtomicNodeState::new(NodeState::Live);
    assert!(!state.transition(NodeState::Tombstoned, NodeState::Compacting));
    assert_eq!(state.load(), NodeState::Live);
}

#[test]
fn test_only_one_racing_delete_wins() {
    let state = Arc::new(AtomicNodeState::new(NodeState::Live));
    let winners: usize = (0..8)
        .map(|_| {
            let state = Arc::clone(&state);
            thread::spawn(move || usize::from(state.transition(NodeState::Live, NodeState::Tombstoned)))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .sum();
    assert_eq!(winners, 1);
}

#[test]
fn test_visibility() {
    assert!(NodeState::Live.is_visible_in_results());
    assert!(!NodeState::Tombstoned.is_visible_in_results());
    assert!(NodeState::Tombstoned.is_traversable());
    assert!(!NodeState::Compacting.is_traversable());
    assert!(!NodeState::Freed.is_traversable());
}

#[test]
fn test_epoch_pins_track_oldest_reader() {
    let epochs = ReaderEpochs::new();
    assert_eq!(epochs.oldest_pinned(), None);

    let first = epochs.pin();
    assert_eq!(first.epoch(), 0);
    assert_eq!(epochs.advance(), 0);

    let second = epochs.pin();
    assert_eq!(second.epoch(), 1);
    assert_eq!(epochs.oldest_pinned(), Some(0));
    assert_eq!(epochs.pinned_readers(), 2);

    drop(first);
    assert_eq!(epochs.oldest_pinned(), Some(1));
    drop(second);
    assert_eq!(epochs.oldest_pinned(), None);
}

#[test]
fn test_gate_shared_entries_coexist() {
    let gate = StructureGate::new();
    let a = gate.shared();
    let b = gate.shared();
    drop((a, b));
    let _exclusive = gate.exclusive();
}
