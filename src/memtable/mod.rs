//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Hold every version written since the last rotation
//! - Single-writer/multi-reader access pattern without reader locks
//! - Track approximate size for rotation decisions
//! - Ordered iteration for the flush path
//!
//! ## Data Structure Choice
//! A concurrent skip list ([`SkipList`]) over [`VersionedKey`]s. Nodes live in
//! an arena owned by the list, so a memtable is freed in one step once the
//! last `Arc` to it is dropped.

mod key;
pub mod skiplist;
mod table;

pub use key::{SequenceNumber, ValueKind, VersionedKey, MAX_SEQUENCE_NUMBER};
pub use skiplist::SkipList;
pub use table::{MemTable, MemTableIterator};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}
