//! Version View
//!
//! Read-mostly view of the store's version state as seen by the write path:
//! level-0 pressure, the sequence counter and file number allocation. Level
//! and file internals stay behind this boundary.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::memtable::SequenceNumber;

/// What the write path needs from version state. Every call is atomic.
pub trait VersionView: Send + Sync {
    /// Number of files at level 0
    fn level0_file_count(&self) -> u32;

    /// Sequence number of the last applied operation
    fn last_sequence(&self) -> SequenceNumber;

    fn set_last_sequence(&self, sequence: SequenceNumber);

    /// Allocate a fresh file number
    fn new_file_number(&self) -> u64;

    /// Give back `number` if it was the last one allocated
    fn reuse_file_number(&self, number: u64);

    /// True when level compaction has work to do
    fn needs_compaction(&self) -> bool;
}

/// In-process version state backed by atomics
///
/// ## Concurrency:
/// - All counters are lock-free atomics shared between the write path and
///   the background compactor
pub struct VersionSet {
    last_sequence: AtomicU64,
    next_file_number: AtomicU64,
    level0_files: AtomicU32,
    compaction_trigger: u32,
    compaction_requested: AtomicBool,
}

impl VersionSet {
    /// Fresh state. File numbers start at 1, sequences at 0.
    pub fn new(compaction_trigger: u32) -> Self {
        Self {
            last_sequence: AtomicU64::new(0),
            next_file_number: AtomicU64::new(1),
            level0_files: AtomicU32::new(0),
            compaction_trigger,
            compaction_requested: AtomicBool::new(false),
        }
    }

    /// Ensure future file numbers are greater than `number`
    pub fn mark_file_number_used(&self, number: u64) {
        self.next_file_number
            .fetch_max(number + 1, Ordering::SeqCst);
    }

    /// Peek at the next file number without allocating it
    pub fn next_file_number(&self) -> u64 {
        self.next_file_number.load(Ordering::SeqCst)
    }

    /// Record a new level-0 file
    pub fn add_level0_file(&self) {
        self.level0_files.fetch_add(1, Ordering::SeqCst);
    }

    /// Overwrite the level-0 count (after a compaction rewrote level 0)
    pub fn set_level0_file_count(&self, count: u32) {
        self.level0_files.store(count, Ordering::SeqCst);
    }

    /// Ask for a level compaction regardless of the trigger
    pub fn request_compaction(&self, requested: bool) {
        self.compaction_requested.store(requested, Ordering::SeqCst);
    }

    pub fn compaction_trigger(&self) -> u32 {
        self.compaction_trigger
    }
}

impl VersionView for VersionSet {
    fn level0_file_count(&self) -> u32 {
        self.level0_files.load(Ordering::SeqCst)
    }

    fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence.load(Ordering::SeqCst)
    }

    fn set_last_sequence(&self, sequence: SequenceNumber) {
        let previous = self.last_sequence.swap(sequence, Ordering::SeqCst);
        debug_assert!(sequence >= previous, "last sequence moved backwards");
    }

    fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    fn reuse_file_number(&self, number: u64) {
        let _ = self.next_file_number.compare_exchange(
            number + 1,
            number,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn needs_compaction(&self) -> bool {
        self.compaction_requested.load(Ordering::SeqCst)
            || self.level0_file_count() >= self.compaction_trigger
    }
}
