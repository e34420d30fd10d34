//! Environment
//!
//! The engine's window onto the outside world: creating log segment files and
//! running deferred background work. Tests swap in their own `Env` to inject
//! I/O failures or to hold background tasks.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::error::Result;

/// Unit of deferred work handed to [`Env::schedule`]
pub type BackgroundTask = Box<dyn FnOnce() + Send + 'static>;

/// Append-only file sink for one log segment
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push buffered bytes to the OS
    fn flush(&mut self) -> io::Result<()>;

    /// Force written bytes to stable storage
    fn sync(&mut self) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// File creation + background execution
pub trait Env: Send + Sync {
    /// Create (truncating) a file for appending
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    /// Run `task` asynchronously, at most once
    fn schedule(&self, task: BackgroundTask);
}

// =============================================================================
// Default Env
// =============================================================================

/// Local filesystem plus one background worker thread fed by a channel
pub struct DefaultEnv {
    worker: Mutex<Option<Sender<BackgroundTask>>>,
}

impl DefaultEnv {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
        }
    }

    fn spawn_worker() -> Result<Sender<BackgroundTask>> {
        let (tx, rx) = channel::unbounded::<BackgroundTask>();
        thread::Builder::new()
            .name("emberkv-bg".to_string())
            .spawn(move || {
                for task in rx {
                    task();
                }
                tracing::debug!("background worker exiting");
            })?;
        Ok(tx)
    }
}

impl Default for DefaultEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for DefaultEnv {
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        Ok(Box::new(FsWritableFile::create(path)?))
    }

    fn schedule(&self, task: BackgroundTask) {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            match Self::spawn_worker() {
                Ok(tx) => *worker = Some(tx),
                Err(e) => {
                    tracing::error!(error = %e, "failed to start background worker");
                    return;
                }
            }
        }
        if let Some(tx) = worker.as_ref() {
            if tx.send(task).is_err() {
                tracing::error!("background worker is gone; task dropped");
            }
        }
    }
}

/// Buffered local file
pub struct FsWritableFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FsWritableFile {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// =============================================================================
// File Naming
// =============================================================================

/// Path of log segment `number` inside `dir`
pub fn log_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.log", number))
}

/// Parse a log segment number from a path
/// "000042.log" → Some(42)
pub fn parse_log_number(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != "log" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Largest log segment number present in `dir`
pub fn max_log_number(dir: &Path) -> Result<Option<u64>> {
    let mut max = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(number) = parse_log_number(&path) {
                max = max.max(Some(number));
            }
        }
    }
    Ok(max)
}
