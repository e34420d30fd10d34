//! Engine Module
//!
//! The write path of the store: group commit through a writer queue, the
//! write-ahead log, the active/immutable memtable pair and level-0 flow
//! control. Flushing and compaction are delegated to a [`Compactor`] run on
//! the environment's background executor.
//!
//! ## Responsibilities
//! - Serialize concurrent writers into ordered, durable groups
//! - Rotate memtable and log segment when the memtable is full
//! - Throttle writers under level-0 pressure
//! - Serve reads from memtables and retained runs without the write lock

mod flow;
mod group;
mod writer;

use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::batch::WriteBatch;
use crate::compaction::{Compactor, InMemoryCompactor};
use crate::config::{Config, WriteOptions};
use crate::env::{log_file_name, max_log_number, DefaultEnv, Env};
use crate::error::{EmberError, Result};
use crate::filter::BloomFilterPolicy;
use crate::memtable::{MemTable, MemTableEntry, SequenceNumber};
use crate::version::{VersionSet, VersionView};
use crate::wal::LogWriter;

use self::writer::Writer;

/// State guarded by the admission lock
pub(crate) struct WriteState {
    writers: VecDeque<Arc<Writer>>,
    log_number: u64,
    /// The current log segment may end in a partial record; the next leader
    /// must rotate before appending
    log_broken: bool,
    bg_error: Option<EmberError>,
    background_compaction_scheduled: bool,
    manual_compaction: bool,
}

impl WriteState {
    fn is_front(&self, writer: &Arc<Writer>) -> bool {
        self.writers
            .front()
            .map_or(false, |front| Arc::ptr_eq(front, writer))
    }
}

/// Active and immutable memtables
#[derive(Clone)]
pub(crate) struct MemTables {
    mem: Arc<MemTable>,
    imm: Option<Arc<MemTable>>,
}

/// Shared engine internals, also owned by scheduled background calls
///
/// ## Locking:
/// - `state` is the admission lock. The writer queue, log number, background
///   error and scheduling flags live behind it.
/// - `memtables` is only written while `state` is held; readers take the
///   read side alone.
/// - `log` is only touched by the current leader. Lock order: state → log.
pub(crate) struct EngineInner {
    config: Config,
    env: Arc<dyn Env>,
    versions: Arc<dyn VersionView>,
    compactor: Arc<dyn Compactor>,

    state: Mutex<WriteState>,
    background_work_finished: Condvar,

    memtables: RwLock<MemTables>,
    log: Mutex<LogWriter>,

    has_imm: AtomicBool,
    shutting_down: AtomicBool,
}

impl EngineInner {
    /// Stop scheduling background work and wait out a scheduled call
    fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let mut state = self.state.lock();
        while state.background_compaction_scheduled {
            self.background_work_finished.wait(&mut state);
        }
    }
}

/// The write-path engine
///
/// ## Concurrency Model: Group Commit / Lock-Free Reads
///
/// - **Writes** (put/delete/write): queued under the admission lock; the
///   front writer commits a whole group with the lock released
/// - **Reads** (get): never take the admission lock; memtable lookups are
///   lock-free against concurrent inserts
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Opens an [`Engine`] with injected collaborators
pub struct EngineBuilder {
    config: Config,
    env: Option<Arc<dyn Env>>,
    versions: Option<Arc<VersionSet>>,
    compactor: Option<Arc<dyn Compactor>>,
}

impl EngineBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            env: None,
            versions: None,
            compactor: None,
        }
    }

    /// File creation and background executor (default: [`DefaultEnv`])
    pub fn env(mut self, env: Arc<dyn Env>) -> Self {
        self.env = Some(env);
        self
    }

    /// Version state shared with the compactor
    pub fn versions(mut self, versions: Arc<VersionSet>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Flush and compaction backend (default: [`InMemoryCompactor`] with a
    /// bloom filter)
    pub fn compactor(mut self, compactor: Arc<dyn Compactor>) -> Self {
        self.compactor = Some(compactor);
        self
    }

    /// Open the engine
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Skip file numbers of log segments already present
    /// 3. Start a fresh log segment and an empty memtable
    pub fn open(self) -> Result<Engine> {
        let config = self.config;
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let versions = self
            .versions
            .unwrap_or_else(|| Arc::new(VersionSet::new(config.l0_compaction_trigger)));
        if let Some(existing) = max_log_number(&config.data_dir)? {
            versions.mark_file_number_used(existing);
        }

        let env: Arc<dyn Env> = match self.env {
            Some(env) => env,
            None => Arc::new(DefaultEnv::new()),
        };
        let compactor: Arc<dyn Compactor> = match self.compactor {
            Some(compactor) => compactor,
            None => Arc::new(InMemoryCompactor::new(
                Arc::clone(&versions),
                Arc::new(BloomFilterPolicy::new(config.filter_bits_per_key)),
            )),
        };

        let log_number = versions.new_file_number();
        let file = match env.new_writable_file(&log_file_name(&config.data_dir, log_number)) {
            Ok(file) => file,
            Err(e) => {
                versions.reuse_file_number(log_number);
                return Err(e);
            }
        };

        tracing::info!(
            data_dir = %config.data_dir.display(),
            log_number,
            "engine opened"
        );

        let versions: Arc<dyn VersionView> = versions;
        let inner = EngineInner {
            config,
            env,
            versions,
            compactor,
            state: Mutex::new(WriteState {
                writers: VecDeque::new(),
                log_number,
                log_broken: false,
                bg_error: None,
                background_compaction_scheduled: false,
                manual_compaction: false,
            }),
            background_work_finished: Condvar::new(),
            memtables: RwLock::new(MemTables {
                mem: Arc::new(MemTable::new()),
                imm: None,
            }),
            log: Mutex::new(LogWriter::new(file, log_number)),
            has_imm: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        };

        Ok(Engine {
            inner: Arc::new(inner),
        })
    }
}

impl Engine {
    /// Open an engine with the default environment and compactor
    pub fn open(config: Config) -> Result<Self> {
        EngineBuilder::new(config).open()
    }

    /// Builder for injecting an environment, version state or compactor
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Insert or update a key
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(&WriteOptions::default(), batch)
    }

    /// Delete a key (writes a tombstone)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(&WriteOptions::default(), batch)
    }

    /// Apply a batch atomically. Its operations receive consecutive
    /// sequence numbers.
    pub fn write(&self, options: &WriteOptions, batch: WriteBatch) -> Result<()> {
        self.inner.write(Some(batch), options.sync)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get the latest value for a key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_at(key, self.inner.versions.last_sequence())
    }

    /// Get the value for a key as of `snapshot`
    ///
    /// Lookup order (newest first):
    /// 1. Active memtable
    /// 2. Immutable memtable
    /// 3. Runs retained by the compactor
    pub fn get_at(&self, key: &[u8], snapshot: SequenceNumber) -> Result<Option<Vec<u8>>> {
        let tables = self.inner.memtables.read().clone();

        let found = match tables.mem.get(key, snapshot) {
            Some(entry) => Some(entry),
            None => match tables.imm.as_ref().and_then(|imm| imm.get(key, snapshot)) {
                Some(entry) => Some(entry),
                None => self.inner.compactor.get(key, snapshot)?,
            },
        };

        Ok(match found {
            Some(MemTableEntry::Value(value)) => Some(value),
            Some(MemTableEntry::Tombstone) | None => None,
        })
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rotate the active memtable even if it has room, then wait for it to
    /// be flushed
    pub fn compact_memtable(&self) -> Result<()> {
        self.inner.write(None, false)?;

        let mut state = self.inner.state.lock();
        while self.inner.has_imm.load(Ordering::Acquire) && state.bg_error.is_none() {
            self.inner.background_work_finished.wait(&mut state);
        }
        match &state.bg_error {
            Some(err) => Err(err.clone().into_background()),
            None => Ok(()),
        }
    }

    /// Request a level compaction and wait for it to run
    pub fn compact_levels(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.manual_compaction = true;
        self.inner.maybe_schedule_compaction(&mut state);
        while state.manual_compaction
            && state.bg_error.is_none()
            && !self.inner.shutting_down.load(Ordering::Acquire)
        {
            self.inner.background_work_finished.wait(&mut state);
        }
        match &state.bg_error {
            Some(err) => Err(err.clone().into_background()),
            None => Ok(()),
        }
    }

    /// Gracefully shut down: wait for background work, then sync and close
    /// the current log segment
    pub fn close(self) -> Result<()> {
        self.inner.shutdown();
        let mut log = self.inner.log.lock();
        log.sync()?;
        log.close()?;
        tracing::info!(log_number = log.number(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Sequence number of the last committed operation
    pub fn last_sequence(&self) -> SequenceNumber {
        self.inner.versions.last_sequence()
    }

    /// Number of the log segment currently appended to
    pub fn log_number(&self) -> u64 {
        self.inner.state.lock().log_number
    }

    pub fn has_immutable_memtable(&self) -> bool {
        self.inner.has_imm.load(Ordering::Acquire)
    }

    /// Handle on the memtable currently receiving writes
    pub fn active_memtable(&self) -> Arc<MemTable> {
        Arc::clone(&self.inner.memtables.read().mem)
    }

    /// Handle on the memtable awaiting flush, if any
    pub fn immutable_memtable(&self) -> Option<Arc<MemTable>> {
        self.inner.memtables.read().imm.clone()
    }

    /// Sticky background error, if one was recorded
    pub fn background_error(&self) -> Option<EmberError> {
        self.inner.state.lock().bg_error.clone()
    }

    pub fn versions(&self) -> &Arc<dyn VersionView> {
        &self.inner.versions
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}
