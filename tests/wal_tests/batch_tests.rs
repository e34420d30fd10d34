//! WriteBatch Tests
//!
//! Tests verify:
//! - Op accounting and size estimates
//! - Encoding round trip restores size accounting
//! - Consecutive sequence stamping on apply

use emberkv::batch::WriteBatch;
use emberkv::memtable::{MemTable, MemTableEntry, ValueKind};
use emberkv::EmberError;

#[test]
fn test_put_and_delete_counts() {
    let mut batch = WriteBatch::new();
    assert!(batch.is_empty());

    batch
        .put(b"k1".to_vec(), b"v1".to_vec())
        .delete(b"k2".to_vec())
        .put(b"k3".to_vec(), b"v3".to_vec());

    assert_eq!(batch.count(), 3);
    let kinds: Vec<ValueKind> = batch.ops().iter().map(|op| op.kind).collect();
    assert_eq!(kinds, vec![ValueKind::Put, ValueKind::Delete, ValueKind::Put]);
    assert_eq!(batch.ops()[1].value, None);
}

#[test]
fn test_approximate_size_grows_with_payload() {
    let mut batch = WriteBatch::new();
    let empty = batch.approximate_size();

    batch.put(b"key".to_vec(), vec![0u8; 1000]);
    assert!(batch.approximate_size() >= empty + 1003);
}

#[test]
fn test_decode_restores_size() {
    let mut batch = WriteBatch::new();
    batch.put(b"alpha".to_vec(), b"one".to_vec()).delete(b"beta".to_vec());
    batch.set_sequence(99);

    let decoded = WriteBatch::decode(&batch.encode().unwrap()).unwrap();
    assert_eq!(decoded.sequence(), 99);
    assert_eq!(decoded.count(), 2);
    assert_eq!(decoded.approximate_size(), batch.approximate_size());
}

#[test]
fn test_decode_rejects_garbage() {
    let err = WriteBatch::decode(&[0xff; 3]).unwrap_err();
    assert!(matches!(err, EmberError::Serialization(_)));
}

#[test]
fn test_insert_into_stamps_consecutive_sequences() {
    let mut batch = WriteBatch::new();
    batch
        .put(b"a".to_vec(), b"1".to_vec())
        .put(b"a".to_vec(), b"2".to_vec())
        .delete(b"b".to_vec());
    batch.set_sequence(10);

    let mem = MemTable::new();
    batch.insert_into(&mem).unwrap();

    let sequences: Vec<(Vec<u8>, u64)> = mem
        .iter()
        .map(|(key, _)| (key.user_key.clone(), key.sequence))
        .collect();
    assert_eq!(
        sequences,
        vec![(b"a".to_vec(), 11), (b"a".to_vec(), 10), (b"b".to_vec(), 12)]
    );
    assert_eq!(mem.get(b"a", 10), Some(MemTableEntry::Value(b"1".to_vec())));
    assert_eq!(mem.get(b"a", 11), Some(MemTableEntry::Value(b"2".to_vec())));
    assert_eq!(mem.get(b"b", 12), Some(MemTableEntry::Tombstone));
}
