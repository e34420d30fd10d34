//! Shared test environments
//!
//! - `FaultyEnv`: real files with switchable append/sync/create/close failures
//!   and torn appends
//! - `ManualEnv`: in-memory files; background tasks run only when asked
//! - `FailingCompactor`: flush always fails

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use emberkv::compaction::Compactor;
use emberkv::env::{BackgroundTask, DefaultEnv, Env, FsWritableFile, WritableFile};
use emberkv::memtable::MemTable;
use emberkv::{EmberError, Result};

// =============================================================================
// Fault Injection
// =============================================================================

#[derive(Default)]
pub struct FaultFlags {
    pub fail_append: AtomicBool,
    pub fail_sync: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_close: AtomicBool,
    /// Next append writes half its bytes, then fails (one shot)
    pub tear_append: AtomicBool,
}

impl FaultFlags {
    fn injected(flag: &AtomicBool, what: &str) -> io::Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what)))
        } else {
            Ok(())
        }
    }
}

pub struct FaultyEnv {
    pub flags: Arc<FaultFlags>,
    inner: DefaultEnv,
}

impl FaultyEnv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            flags: Arc::new(FaultFlags::default()),
            inner: DefaultEnv::new(),
        })
    }
}

struct FaultyFile {
    inner: FsWritableFile,
    flags: Arc<FaultFlags>,
}

impl WritableFile for FaultyFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        FaultFlags::injected(&self.flags.fail_append, "append")?;
        if self.flags.tear_append.swap(false, Ordering::SeqCst) {
            self.inner.append(&data[..data.len() / 2])?;
            self.inner.flush()?;
            return Err(io::Error::new(io::ErrorKind::Other, "injected torn append"));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        FaultFlags::injected(&self.flags.fail_sync, "sync")?;
        self.inner.sync()
    }

    fn close(&mut self) -> io::Result<()> {
        FaultFlags::injected(&self.flags.fail_close, "close")?;
        self.inner.close()
    }
}

impl Env for FaultyEnv {
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        FaultFlags::injected(&self.flags.fail_create, "create")?;
        Ok(Box::new(FaultyFile {
            inner: FsWritableFile::create(path)?,
            flags: Arc::clone(&self.flags),
        }))
    }

    fn schedule(&self, task: BackgroundTask) {
        self.inner.schedule(task);
    }
}

// =============================================================================
// Manual Background Execution
// =============================================================================

/// Log sink kept in memory
struct MemFile {
    data: Vec<u8>,
}

impl WritableFile for MemFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct ManualEnv {
    tasks: Mutex<Vec<BackgroundTask>>,
    scheduled: AtomicUsize,
    files_created: AtomicUsize,
}

impl ManualEnv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Tasks waiting to run
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Total tasks ever scheduled
    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    pub fn files_created(&self) -> usize {
        self.files_created.load(Ordering::SeqCst)
    }

    /// Run the tasks queued right now; returns how many ran
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Run until no task is left (tasks may schedule follow-ups)
    pub fn drain(&self) {
        while self.run_pending() > 0 {}
    }
}

impl Env for ManualEnv {
    fn new_writable_file(&self, _path: &Path) -> Result<Box<dyn WritableFile>> {
        self.files_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemFile { data: Vec::new() }))
    }

    fn schedule(&self, task: BackgroundTask) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().push(task);
    }
}

// =============================================================================
// Compactors
// =============================================================================

pub struct FailingCompactor;

impl Compactor for FailingCompactor {
    fn flush_memtable(&self, _mem: &Arc<MemTable>) -> Result<()> {
        Err(EmberError::from(io::Error::new(
            io::ErrorKind::Other,
            "injected flush failure",
        )))
    }

    fn compact(&self) -> Result<()> {
        Ok(())
    }
}
