//! Group Commit
//!
//! Writers enqueue under the admission lock and sleep until they are either
//! served by another leader or reach the front of the queue. The front writer
//! becomes the leader: it makes room, folds a prefix of the queue into one
//! batch, appends that batch to the log and applies it to the memtable with
//! the lock released, then hands the shared result to every writer it served.
//!
//! ```text
//!   queue:  [L] [w1] [w2] [force] [w4]
//!            └────┬────┘
//!             one group (stops before the forced rotation entry)
//! ```

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::batch::WriteBatch;
use crate::error::{EmberError, Result};
use crate::memtable::MemTable;

use super::writer::Writer;
use super::{EngineInner, WriteState};

/// Where a group commit failed once the lock was released
enum CommitError {
    /// The record did not fully reach the log; the segment is retired
    Append(EmberError),
    /// The record may or may not be durable
    Sync(EmberError),
    /// The memtable refused an entry the log already holds
    Apply(EmberError),
}

/// A group folded from the front of the writer queue
pub(crate) struct Group {
    pub(crate) batch: WriteBatch,
    pub(crate) last_writer: Arc<Writer>,
    pub(crate) sync: bool,
}

impl EngineInner {
    /// Admit one write (or, with `batch == None`, a forced rotation) through
    /// the writer queue
    pub(crate) fn write(self: &Arc<Self>, batch: Option<WriteBatch>, sync: bool) -> Result<()> {
        let writer = Arc::new(Writer::new(batch, sync));
        let force = writer.batch().is_none();

        let mut state = self.state.lock();
        state.writers.push_back(Arc::clone(&writer));
        while !writer.is_done() && !state.is_front(&writer) {
            writer.wait(&mut state);
        }
        if writer.is_done() {
            return writer.take_result();
        }

        // Leader from here on
        let mut last_writer = Arc::clone(&writer);
        let mut result = self.make_room_for_write(&mut state, force);
        if result.is_ok() && !force {
            result = match self.build_batch_group(&state) {
                Ok(mut group) => {
                    last_writer = Arc::clone(&group.last_writer);
                    self.commit_group(&mut state, &mut group)
                }
                Err(e) => Err(e),
            };
        }

        // Release every writer the group served, then wake the next leader
        loop {
            let Some(ready) = state.writers.pop_front() else {
                tracing::error!("writer queue drained before the group's last writer");
                result = Err(EmberError::QueueInvariantViolation(
                    "group's last writer missing from queue".to_string(),
                ));
                break;
            };
            let is_last = Arc::ptr_eq(&ready, &last_writer);
            if !Arc::ptr_eq(&ready, &writer) {
                ready.complete(result.clone());
            }
            if is_last {
                break;
            }
        }
        if let Some(next) = state.writers.front() {
            next.notify();
        }

        result
    }

    /// Fold the front of the queue into one batch.
    ///
    /// The group is capped at `max_group_commit_bytes`; when the leading batch
    /// is small the cap shrinks to its size plus `small_write_group_growth` so
    /// small writes are not held up behind a large one. A writer without a
    /// batch ends the group.
    pub(crate) fn build_batch_group(&self, state: &WriteState) -> Result<Group> {
        let first = state.writers.front().ok_or_else(|| {
            EmberError::QueueInvariantViolation("building a group from an empty queue".to_string())
        })?;
        let first_batch = first.batch().ok_or_else(|| {
            EmberError::QueueInvariantViolation("group leader has no batch".to_string())
        })?;

        let mut size = first_batch.approximate_size();
        let max_size = if size <= self.config.small_write_threshold {
            size + self.config.small_write_group_growth
        } else {
            self.config.max_group_commit_bytes
        };

        let mut batch = WriteBatch::new();
        batch.append(first_batch);
        let mut last_writer = Arc::clone(first);
        let mut sync = first.is_sync();

        for writer in state.writers.iter().skip(1) {
            let Some(next) = writer.batch() else {
                break;
            };
            size += next.approximate_size();
            if size > max_size {
                break;
            }
            batch.append(next);
            sync |= writer.is_sync();
            last_writer = Arc::clone(writer);
        }

        Ok(Group {
            batch,
            last_writer,
            sync,
        })
    }

    /// Stamp, log and apply a group. The admission lock is released while
    /// the log and memtable are touched.
    fn commit_group(&self, state: &mut MutexGuard<'_, WriteState>, group: &mut Group) -> Result<()> {
        let last_sequence = self.versions.last_sequence();
        group.batch.set_sequence(last_sequence + 1);
        let count = group.batch.count() as u64;
        let record = group.batch.encode()?;
        let mem = Arc::clone(&self.memtables.read().mem);

        let sync = group.sync;
        let batch = &group.batch;
        let outcome = MutexGuard::unlocked(state, || self.log_and_apply(batch, &record, &mem, sync));

        // Sequence numbers handed to this group are never reused
        self.versions.set_last_sequence(last_sequence + count);

        match outcome {
            Ok(()) => {
                tracing::trace!(
                    first_sequence = last_sequence + 1,
                    ops = count,
                    bytes = record.len(),
                    sync,
                    "group committed"
                );
                Ok(())
            }
            Err(CommitError::Append(e)) => {
                tracing::warn!(error = %e, "log append failed");
                state.log_broken = true;
                Err(e)
            }
            Err(CommitError::Sync(e)) | Err(CommitError::Apply(e)) => {
                self.record_background_error(state, e.clone());
                Err(e)
            }
        }
    }

    fn log_and_apply(
        &self,
        batch: &WriteBatch,
        record: &[u8],
        mem: &MemTable,
        sync: bool,
    ) -> std::result::Result<(), CommitError> {
        {
            let mut log = self.log.lock();
            log.add_record(record).map_err(CommitError::Append)?;
            if sync {
                log.sync().map_err(CommitError::Sync)?;
            }
        }
        batch.insert_into(mem).map_err(CommitError::Apply)
    }
}
