//! Tests for `tombstone` module

use super::tombstone::TombstoneSet;

#[test]
fn test_insert_and_contains() {
    let set = TombstoneSet::new();
    assert!(set.is_empty());
    assert!(set.insert(4));
    assert!(!set.insert(4));
    assert!(set.contains(4));
    assert!(!set.contains(5));
    assert_eq!(set.len(), 1);
}

#[test]
fn test_peek_batch_is_ascending_and_non_destructive() {
    let set = TombstoneSet::new();
    for id in [90, 3, 41, 7, 1 << 40] {
        set.insert(id);
    }

    assert_eq!(set.peek_batch(3), vec![3, 7, 41]);
    assert_eq!(set.len(), 5);
    assert_eq!(set.peek_batch(10), vec![3, 7, 41, 90, 1 << 40]);
}

#[test]
fn test_remove_all() {
    let set = TombstoneSet::new();
    for id in 0..10 {
        set.insert(id);
    }

    set.remove_all(&[0, 2, 4, 6, 8, 100]);

    assert_eq!(set.to_vec(), vec![1, 3, 5, 7, 9]);
}
