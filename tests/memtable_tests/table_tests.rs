//! MemTable Tests
//!
//! Tests verify:
//! - Snapshot reads over multiple versions of a key
//! - Tombstone handling
//! - Versioned-key iteration order
//! - Size tracking
//! - Concurrent readers during inserts

use std::sync::Arc;
use std::thread;

use emberkv::memtable::{MemTable, MemTableEntry, ValueKind, VersionedKey, MAX_SEQUENCE_NUMBER};
use emberkv::EmberError;

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.approximate_memory_usage(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_add_and_get() {
    let memtable = MemTable::new();
    memtable.add(1, ValueKind::Put, b"key1", b"value1").unwrap();

    assert_eq!(
        memtable.get(b"key1", MAX_SEQUENCE_NUMBER),
        Some(MemTableEntry::Value(b"value1".to_vec()))
    );
    assert_eq!(memtable.get(b"key2", MAX_SEQUENCE_NUMBER), None);
}

#[test]
fn test_get_does_not_match_key_prefix() {
    let memtable = MemTable::new();
    memtable.add(1, ValueKind::Put, b"key10", b"v").unwrap();

    assert_eq!(memtable.get(b"key1", MAX_SEQUENCE_NUMBER), None);
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_sees_version_at_or_below() {
    let memtable = MemTable::new();
    memtable.add(1, ValueKind::Put, b"k", b"A").unwrap();
    memtable.add(2, ValueKind::Put, b"k", b"B").unwrap();
    memtable.add(3, ValueKind::Delete, b"k", b"").unwrap();

    assert_eq!(memtable.get(b"k", 0), None);
    assert_eq!(memtable.get(b"k", 1), Some(MemTableEntry::Value(b"A".to_vec())));
    assert_eq!(memtable.get(b"k", 2), Some(MemTableEntry::Value(b"B".to_vec())));
    assert_eq!(memtable.get(b"k", 3), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.get(b"k", MAX_SEQUENCE_NUMBER), Some(MemTableEntry::Tombstone));
}

#[test]
fn test_delete_ignores_value() {
    let memtable = MemTable::new();
    memtable.add(5, ValueKind::Delete, b"gone", b"ignored").unwrap();

    assert_eq!(memtable.get(b"gone", 5), Some(MemTableEntry::Tombstone));
    assert!(memtable.approximate_memory_usage() > 0);
}

#[test]
fn test_duplicate_version_rejected() {
    let memtable = MemTable::new();
    memtable.add(1, ValueKind::Put, b"k", b"v").unwrap();

    let err = memtable.add(1, ValueKind::Put, b"k", b"other").unwrap_err();
    assert!(matches!(err, EmberError::DuplicateKey));

    // Same key and sequence but a different kind is a distinct entry
    memtable.add(1, ValueKind::Delete, b"k", b"").unwrap();
    assert_eq!(memtable.entry_count(), 2);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iteration_orders_newest_version_first() {
    let memtable = MemTable::new();
    memtable.add(1, ValueKind::Put, b"b", b"b1").unwrap();
    memtable.add(2, ValueKind::Put, b"a", b"a2").unwrap();
    memtable.add(3, ValueKind::Put, b"b", b"b3").unwrap();
    memtable.add(4, ValueKind::Delete, b"a", b"").unwrap();

    let keys: Vec<VersionedKey> = memtable.iter().map(|(key, _)| key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            VersionedKey::new(b"a".to_vec(), 4, ValueKind::Delete),
            VersionedKey::new(b"a".to_vec(), 2, ValueKind::Put),
            VersionedKey::new(b"b".to_vec(), 3, ValueKind::Put),
            VersionedKey::new(b"b".to_vec(), 1, ValueKind::Put),
        ]
    );

    let entries: Vec<MemTableEntry> = memtable.iter().map(|(_, entry)| entry).collect();
    assert_eq!(entries[0], MemTableEntry::Tombstone);
    assert_eq!(entries[3], MemTableEntry::Value(b"b1".to_vec()));
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_memory_usage_counts_payload() {
    let memtable = MemTable::new();
    memtable.add(1, ValueKind::Put, b"key", &[0u8; 1000]).unwrap();
    let small = memtable.approximate_memory_usage();
    assert!(small >= 1003);

    memtable.add(2, ValueKind::Put, b"key", &[0u8; 4000]).unwrap();
    assert!(memtable.approximate_memory_usage() >= small + 4003);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_readers_see_consistent_versions_during_inserts() {
    let memtable = Arc::new(MemTable::new());
    let rounds = 5_000u64;

    let writer = {
        let memtable = Arc::clone(&memtable);
        thread::spawn(move || {
            for seq in 1..=rounds {
                let value = seq.to_le_bytes();
                memtable.add(seq, ValueKind::Put, b"counter", &value).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let memtable = Arc::clone(&memtable);
            thread::spawn(move || {
                let mut last = 0u64;
                for _ in 0..rounds {
                    if let Some(MemTableEntry::Value(bytes)) =
                        memtable.get(b"counter", MAX_SEQUENCE_NUMBER)
                    {
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(&bytes);
                        let seen = u64::from_le_bytes(raw);
                        assert!(seen >= last, "went back from {} to {}", last, seen);
                        last = seen;
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(
        memtable.get(b"counter", 10),
        Some(MemTableEntry::Value(10u64.to_le_bytes().to_vec()))
    );
    assert_eq!(memtable.entry_count() as u64, rounds);
}
