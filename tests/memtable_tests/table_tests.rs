//! MemTable Tests
//!
//! Tests verify:
//! - Insert / lookup / overwrite
//! - Snapshot (MVCC) reads across versions
//! - Tombstone handling
//! - Rejection of malformed keys without mutation
//! - Arena exhaustion
//! - Sorted iteration and min/max tracking

use inkstore::key::key_at;
use inkstore::memtable::{MemTable, ARENA_SIZE, MAX_KEY_SIZE};

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.len(), 0);
    assert!(memtable.is_empty());
    assert_eq!(memtable.min_key(), None);
    assert_eq!(memtable.max_key(), None);
    assert_eq!(memtable.min_version(), None);
    assert_eq!(memtable.max_version(), None);
    // the reserved null allocation
    assert_eq!(memtable.arena_used(), 8);
}

#[test]
fn test_insert_and_lookup() {
    let mut memtable = MemTable::new();
    let key = key_at(b"key1", 1);

    assert!(memtable.insert(&key, b"value1"));

    assert_eq!(memtable.lookup(&key), Some(&b"value1"[..]));
    assert_eq!(memtable.len(), 1);
}

#[test]
fn test_lookup_nonexistent_key() {
    let mut memtable = MemTable::new();
    memtable.insert(&key_at(b"apple", 1), b"1");

    assert_eq!(memtable.lookup(&key_at(b"nonexistent", 1)), None);
    assert_eq!(memtable.lookup(&key_at(b"app", 1)), None);
    assert_eq!(memtable.lookup(&key_at(b"apples", 1)), None);
}

#[test]
fn test_insert_empty_value() {
    let mut memtable = MemTable::new();
    let key = key_at(b"empty", 1);

    assert!(memtable.insert(&key, b""));
    assert_eq!(memtable.lookup(&key), Some(&b""[..]));
}

#[test]
fn test_overwrite_same_version() {
    let mut memtable = MemTable::new();
    let key = key_at(b"overwrite", 1);

    assert!(memtable.insert(&key, b"value1"));
    assert!(memtable.insert(&key, b"value2"));

    assert_eq!(memtable.lookup(&key), Some(&b"value2"[..]));
    assert_eq!(memtable.len(), 1); // no duplicate node
}

// =============================================================================
// MVCC Tests
// =============================================================================

#[test]
fn test_snapshot_reads() {
    let mut memtable = MemTable::new();

    assert!(memtable.insert(&key_at(b"a", 1), b"v1"));
    assert!(memtable.insert(&key_at(b"a", 2), b"v2"));

    assert_eq!(memtable.lookup(&key_at(b"a", 2)), Some(&b"v2"[..]));
    assert_eq!(memtable.lookup(&key_at(b"a", 1)), Some(&b"v1"[..]));
    assert_eq!(memtable.lookup(&key_at(b"a", 3)), Some(&b"v2"[..]));
    assert_eq!(memtable.lookup(&key_at(b"a", 0)), None);

    assert_eq!(memtable.min_version(), Some(1));
    assert_eq!(memtable.max_version(), Some(2));
    assert_eq!(memtable.len(), 2);
}

#[test]
fn test_snapshot_does_not_leak_into_next_key() {
    let mut memtable = MemTable::new();
    memtable.insert(&key_at(b"a", 5), b"a5");
    memtable.insert(&key_at(b"b", 1), b"b1");

    // a@4 sorts after a@5, so the next node is b@1 (different raw key)
    assert_eq!(memtable.lookup(&key_at(b"a", 4)), None);
    assert_eq!(memtable.lookup(&key_at(b"b", 9)), Some(&b"b1"[..]));
}

#[test]
fn test_find_reports_matched_version() {
    let mut memtable = MemTable::new();
    memtable.insert(&key_at(b"k", 10), b"ten");
    memtable.insert(&key_at(b"k", 20), b"twenty");

    let entry = memtable.find(&key_at(b"k", 15)).unwrap();
    assert_eq!(entry.version(), 10);
    assert_eq!(entry.raw_key(), b"k");
    assert_eq!(entry.value, Some(&b"ten"[..]));
}

// =============================================================================
// Delete / Tombstone Tests
// =============================================================================

#[test]
fn test_delete_hides_value() {
    let mut memtable = MemTable::new();
    let key = key_at(b"key1", 1);

    assert!(memtable.insert(&key, b"value1"));
    assert!(memtable.delete(&key));

    assert_eq!(memtable.lookup(&key), None);
    assert_eq!(memtable.len(), 1); // node stays, marked deleted
    assert!(memtable.find(&key).unwrap().is_tombstone());
}

#[test]
fn test_delete_newer_version_keeps_history() {
    let mut memtable = MemTable::new();
    memtable.insert(&key_at(b"a", 1), b"v1");
    assert!(memtable.delete(&key_at(b"a", 2)));

    assert_eq!(memtable.lookup(&key_at(b"a", 1)), Some(&b"v1"[..]));
    assert_eq!(memtable.lookup(&key_at(b"a", 2)), None);
    assert_eq!(memtable.lookup(&key_at(b"a", 5)), None);
    assert_eq!(memtable.max_version(), Some(2));
}

#[test]
fn test_delete_nonexistent_key_creates_tombstone() {
    let mut memtable = MemTable::new();
    let key = key_at(b"ghost", 3);

    assert!(memtable.delete(&key));
    assert_eq!(memtable.len(), 1);
    assert_eq!(memtable.lookup(&key), None);
}

#[test]
fn test_insert_after_delete_at_newer_version() {
    let mut memtable = MemTable::new();
    memtable.insert(&key_at(b"k", 1), b"v1");
    memtable.delete(&key_at(b"k", 2));
    memtable.insert(&key_at(b"k", 3), b"v3");

    assert_eq!(memtable.lookup(&key_at(b"k", 3)), Some(&b"v3"[..]));
    assert_eq!(memtable.lookup(&key_at(b"k", 2)), None);
    assert_eq!(memtable.lookup(&key_at(b"k", 1)), Some(&b"v1"[..]));
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_short_keys_rejected_without_mutation() {
    let mut memtable = MemTable::new();
    memtable.insert(&key_at(b"keep", 1), b"v");
    let used = memtable.arena_used();

    assert!(!memtable.insert(b"short", b"value"));
    assert!(!memtable.delete(b"short"));
    assert_eq!(memtable.lookup(b"short"), None);
    assert_eq!(memtable.lookup(b""), None);

    assert_eq!(memtable.len(), 1);
    assert_eq!(memtable.arena_used(), used);
}

#[test]
fn test_max_key_size() {
    let mut memtable = MemTable::new();

    let max_key = key_at(&vec![0u8; MAX_KEY_SIZE - 8], 1);
    assert!(memtable.insert(&max_key, b"max_value"));

    let oversize_key = key_at(&vec![0u8; MAX_KEY_SIZE - 7], 1);
    assert!(!memtable.insert(&oversize_key, b"oversize_value"));
    assert_eq!(memtable.len(), 1);
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_arena_exhaustion_preserves_entries() {
    let mut memtable = MemTable::with_seed(1);
    let value = vec![7u8; 64 * 1024];

    let mut inserted = 0u64;
    loop {
        let key = key_at(format!("key{:05}", inserted).as_bytes(), 1);
        if !memtable.insert(&key, &value) {
            break;
        }
        inserted += 1;
        assert!(inserted < 1_000, "arena never filled up");
    }

    assert!(inserted > 100);
    assert_eq!(memtable.len() as u64, inserted);
    assert!(memtable.arena_used() <= ARENA_SIZE);

    for i in 0..inserted {
        let key = key_at(format!("key{:05}", i).as_bytes(), 1);
        assert_eq!(memtable.lookup(&key), Some(&value[..]));
    }

    // a small entry may still fit, but the failed one left no trace
    let failed = key_at(format!("key{:05}", inserted).as_bytes(), 1);
    assert_eq!(memtable.lookup(&failed), None);
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_round_trip_100_keys() {
    let mut memtable = MemTable::new();

    for i in 0..100 {
        let key = key_at(format!("k{}", i).as_bytes(), 1);
        assert!(memtable.insert(&key, format!("value{}", i).as_bytes()));
    }

    for i in 0..100 {
        let key = key_at(format!("k{}", i).as_bytes(), 1);
        assert_eq!(memtable.lookup(&key), Some(format!("value{}", i).as_bytes()));
    }

    assert_eq!(memtable.min_key(), Some(&key_at(b"k0", 1)[..]));
    assert_eq!(memtable.max_key(), Some(&key_at(b"k99", 1)[..]));
}

#[test]
fn test_iter_sorted_order() {
    let mut memtable = MemTable::new();

    // Insert in random order
    memtable.insert(&key_at(b"cherry", 1), b"3");
    memtable.insert(&key_at(b"apple", 1), b"1");
    memtable.insert(&key_at(b"banana", 1), b"2");
    memtable.insert(&key_at(b"apple", 7), b"1-new");

    let keys: Vec<Vec<u8>> = memtable.iter().map(|e| e.key.to_vec()).collect();
    assert_eq!(
        keys,
        vec![
            key_at(b"apple", 7), // newest version first
            key_at(b"apple", 1),
            key_at(b"banana", 1),
            key_at(b"cherry", 1),
        ]
    );
}

#[test]
fn test_iter_includes_tombstones() {
    let mut memtable = MemTable::new();

    memtable.insert(&key_at(b"key1", 1), b"value1");
    memtable.delete(&key_at(b"key2", 1));
    memtable.insert(&key_at(b"key3", 1), b"value3");

    let entries: Vec<_> = memtable.iter().collect();

    assert_eq!(entries.len(), 3);
    assert!(!entries[0].is_tombstone());
    assert!(entries[1].is_tombstone());
    assert_eq!(entries[2].value, Some(&b"value3"[..]));
}

#[test]
fn test_iter_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.iter().count(), 0);
}

#[test]
fn test_many_versions_interleaved() {
    let mut memtable = MemTable::with_seed(2024);

    for version in 1..=20u64 {
        for k in 0..50 {
            let key = key_at(format!("user{:02}", k).as_bytes(), version * 10);
            assert!(memtable.insert(&key, format!("{}:{}", k, version).as_bytes()));
        }
    }

    for k in 0..50 {
        for version in 1..=20u64 {
            // any snapshot between two writes sees the older write
            let key = key_at(format!("user{:02}", k).as_bytes(), version * 10 + 5);
            assert_eq!(
                memtable.lookup(&key),
                Some(format!("{}:{}", k, version).as_bytes())
            );
        }
    }

    assert_eq!(memtable.len(), 1_000);
    assert_eq!(memtable.min_version(), Some(10));
    assert_eq!(memtable.max_version(), Some(200));
}
