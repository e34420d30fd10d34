//! Queued writer handle

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::batch::WriteBatch;
use crate::error::{EmberError, Result};

use super::WriteState;

/// One pending write in the admission queue.
///
/// A writer without a batch is a forced memtable rotation request. Its
/// signal is only ever waited on with the engine's admission lock held.
pub(crate) struct Writer {
    batch: Option<WriteBatch>,
    sync: bool,
    done: AtomicBool,
    result: Mutex<Option<Result<()>>>,
    signal: Condvar,
}

impl Writer {
    pub(crate) fn new(batch: Option<WriteBatch>, sync: bool) -> Self {
        Self {
            batch,
            sync,
            done: AtomicBool::new(false),
            result: Mutex::new(None),
            signal: Condvar::new(),
        }
    }

    pub(crate) fn batch(&self) -> Option<&WriteBatch> {
        self.batch.as_ref()
    }

    pub(crate) fn is_sync(&self) -> bool {
        self.sync
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Hand the outcome of a group commit to a writer the leader served.
    /// Called with the admission lock held.
    pub(crate) fn complete(&self, result: Result<()>) {
        *self.result.lock() = Some(result);
        self.done.store(true, Ordering::Release);
        self.signal.notify_one();
    }

    /// Outcome stored by `complete`
    pub(crate) fn take_result(&self) -> Result<()> {
        self.result.lock().take().unwrap_or_else(|| {
            Err(EmberError::QueueInvariantViolation(
                "completed writer carries no result".to_string(),
            ))
        })
    }

    /// Block until completed or promoted to the front of the queue
    pub(crate) fn wait(&self, state: &mut MutexGuard<'_, WriteState>) {
        self.signal.wait(state);
    }

    /// Wake this writer so it can take over as leader
    pub(crate) fn notify(&self) {
        self.signal.notify_one();
    }
}
