//! Background Flush and Compaction
//!
//! The write path hands immutable memtables and level-pressure relief to a
//! [`Compactor`]. The on-disk table format and the level merge algorithm live
//! behind this trait.
//!
//! [`InMemoryCompactor`] is the built-in implementation: it retains flushed
//! memtables as sorted level-0 runs (each with a membership filter) and, on
//! compaction, merges every run into a single base run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::filter::FilterPolicy;
use crate::memtable::{MemTable, MemTableEntry, SequenceNumber, VersionedKey};
use crate::version::{VersionSet, VersionView};

/// Background work the engine schedules but does not perform itself
pub trait Compactor: Send + Sync {
    /// Make the contents of an immutable memtable durable. The engine
    /// releases its reference once this returns `Ok`.
    fn flush_memtable(&self, mem: &Arc<MemTable>) -> Result<()>;

    /// Relieve level pressure (called when the version view needs compaction
    /// or a manual compaction was requested)
    fn compact(&self) -> Result<()>;

    /// Newest version of `user_key` at `snapshot` among flushed data
    fn get(&self, _user_key: &[u8], _snapshot: SequenceNumber) -> Result<Option<MemTableEntry>> {
        Ok(None)
    }
}

// =============================================================================
// Sorted Runs
// =============================================================================

/// Immutable sorted run of versioned entries plus a filter over its user keys
struct Run {
    entries: Vec<(VersionedKey, MemTableEntry)>,
    filter: Vec<u8>,
}

impl Run {
    /// `entries` must already be in versioned-key order
    fn build(entries: Vec<(VersionedKey, MemTableEntry)>, policy: &dyn FilterPolicy) -> Self {
        let mut user_keys: Vec<&[u8]> = Vec::new();
        for (key, _) in &entries {
            if user_keys.last() != Some(&key.user_key.as_slice()) {
                user_keys.push(&key.user_key);
            }
        }
        let filter = policy.create_filter(&user_keys);
        Self { entries, filter }
    }

    fn get(
        &self,
        user_key: &[u8],
        snapshot: SequenceNumber,
        policy: &dyn FilterPolicy,
    ) -> Option<MemTableEntry> {
        if !policy.key_may_match(user_key, &self.filter) {
            return None;
        }
        let probe = VersionedKey::lookup(user_key, snapshot);
        let index = self.entries.partition_point(|(key, _)| *key < probe);
        match self.entries.get(index) {
            Some((key, entry)) if key.user_key == user_key => Some(entry.clone()),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Levels {
    /// Newest first
    level0: Vec<Arc<Run>>,
    base: Option<Arc<Run>>,
}

// =============================================================================
// InMemoryCompactor
// =============================================================================

/// Retaining in-memory compactor
///
/// ## Concurrency:
/// - `levels`: RwLock (lookups share, flush/compact replace)
/// - Flush and compaction are serialized by the engine's scheduling guard
pub struct InMemoryCompactor {
    versions: Arc<VersionSet>,
    policy: Arc<dyn FilterPolicy>,
    levels: RwLock<Levels>,
    flushes: AtomicU64,
    compactions: AtomicU64,
}

impl InMemoryCompactor {
    pub fn new(versions: Arc<VersionSet>, policy: Arc<dyn FilterPolicy>) -> Self {
        Self {
            versions,
            policy,
            levels: RwLock::new(Levels::default()),
            flushes: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
        }
    }

    /// Number of level-0 runs currently retained
    pub fn level0_runs(&self) -> usize {
        self.levels.read().level0.len()
    }

    /// Entries in the base run
    pub fn base_entries(&self) -> usize {
        self.levels
            .read()
            .base
            .as_ref()
            .map_or(0, |run| run.entries.len())
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn compaction_count(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }
}

impl Compactor for InMemoryCompactor {
    fn flush_memtable(&self, mem: &Arc<MemTable>) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        if mem.is_empty() {
            tracing::debug!("skipping flush of empty memtable");
            return Ok(());
        }

        let entries: Vec<_> = mem.iter().map(|(key, entry)| (key.clone(), entry)).collect();
        let count = entries.len();
        let run = Arc::new(Run::build(entries, self.policy.as_ref()));

        let mut levels = self.levels.write();
        levels.level0.insert(0, run);
        self.versions.add_level0_file();
        tracing::debug!(
            entries = count,
            level0 = levels.level0.len(),
            "flushed memtable to level-0 run"
        );
        Ok(())
    }

    fn compact(&self) -> Result<()> {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.levels.write();
        let levels = &mut *guard;

        let mut merged: Vec<(VersionedKey, MemTableEntry)> = Vec::new();
        for run in levels.level0.drain(..).chain(levels.base.take()) {
            merged.extend(run.entries.iter().cloned());
        }
        // Sequence numbers are unique, so versioned keys never tie
        merged.sort_by(|a, b| a.0.cmp(&b.0));

        let count = merged.len();
        levels.base = Some(Arc::new(Run::build(merged, self.policy.as_ref())));
        self.versions.set_level0_file_count(0);
        self.versions.request_compaction(false);

        tracing::info!(entries = count, "merged level-0 runs into base run");
        Ok(())
    }

    fn get(&self, user_key: &[u8], snapshot: SequenceNumber) -> Result<Option<MemTableEntry>> {
        let levels = self.levels.read();
        for run in levels.level0.iter().chain(levels.base.iter()) {
            if let Some(entry) = run.get(user_key, snapshot, self.policy.as_ref()) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}
