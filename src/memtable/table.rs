//! MemTable implementation
//!
//! Skip-list-backed memtable of versioned keys.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;

use super::key::{SequenceNumber, ValueKind, VersionedKey};
use super::skiplist::{self, SkipList};
use super::MemTableEntry;

/// One skip list slot: the versioned key and its value bytes.
/// Ordered and compared by key only.
struct Slot {
    key: VersionedKey,
    value: Vec<u8>,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key.cmp(&other.key)
    }
}

/// In-memory table for recent writes
///
/// ## Concurrency:
/// - `add`: one writer at a time (the group-commit leader)
/// - `get` / `iter`: any number of readers, never blocked
///
/// Shared through `Arc`: the write path holds one reference while the table is
/// active, the background flush path another once it is immutable.
pub struct MemTable {
    table: SkipList<Slot>,
    /// Key and value bytes owned by slots
    payload_bytes: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            table: SkipList::new(),
            payload_bytes: AtomicUsize::new(0),
        }
    }

    /// Record one mutation of `user_key` at `sequence`.
    ///
    /// `value` is ignored for deletes. Re-adding an identical
    /// (key, sequence, kind) fails with `DuplicateKey`.
    pub fn add(
        &self,
        sequence: SequenceNumber,
        kind: ValueKind,
        user_key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let value = match kind {
            ValueKind::Put => value.to_vec(),
            ValueKind::Delete => Vec::new(),
        };
        let bytes = user_key.len() + value.len();
        self.table.insert(Slot {
            key: VersionedKey::new(user_key, sequence, kind),
            value,
        })?;
        self.payload_bytes.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    /// Newest version of `user_key` with sequence <= `snapshot`.
    ///
    /// Returns:
    /// - `Some(Value)`: live value
    /// - `Some(Tombstone)`: deleted at this snapshot
    /// - `None`: this memtable holds no visible version
    pub fn get(&self, user_key: &[u8], snapshot: SequenceNumber) -> Option<MemTableEntry> {
        let probe = Slot {
            key: VersionedKey::lookup(user_key, snapshot),
            value: Vec::new(),
        };
        let mut cursor = self.table.cursor();
        cursor.seek(&probe);
        if !cursor.valid() {
            return None;
        }
        let slot = cursor.key();
        if slot.key.user_key != user_key {
            return None;
        }
        Some(match slot.key.kind {
            ValueKind::Put => MemTableEntry::Value(slot.value.clone()),
            ValueKind::Delete => MemTableEntry::Tombstone,
        })
    }

    /// Approximate bytes used, for flow control only
    pub fn approximate_memory_usage(&self) -> usize {
        self.table.approximate_memory_usage() + self.payload_bytes.load(Ordering::Relaxed)
    }

    /// Number of versioned entries
    pub fn entry_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Iterate entries in versioned-key order (newest version of a key first)
    pub fn iter(&self) -> MemTableIterator<'_> {
        MemTableIterator {
            inner: self.table.iter(),
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over MemTable entries
pub struct MemTableIterator<'a> {
    inner: skiplist::Iter<'a, Slot>,
}

impl<'a> Iterator for MemTableIterator<'a> {
    type Item = (&'a VersionedKey, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.inner.next()?;
        let entry = match slot.key.kind {
            ValueKind::Put => MemTableEntry::Value(slot.value.clone()),
            ValueKind::Delete => MemTableEntry::Tombstone,
        };
        Some((&slot.key, entry))
    }
}
