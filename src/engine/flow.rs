//! Flow Control and Background Scheduling
//!
//! `make_room_for_write` runs on the group leader before every commit and
//! decides, from memtable fullness and level-0 pressure, whether the write
//! proceeds, is delayed once, waits for background work, or rotates the
//! memtable and log segment.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use parking_lot::MutexGuard;

use crate::env::log_file_name;
use crate::error::{EmberError, Result};
use crate::memtable::MemTable;
use crate::wal::LogWriter;

use super::{EngineInner, WriteState};

impl EngineInner {
    /// Ensure the active memtable can take the next group.
    ///
    /// Must be called by the leader with the admission lock held. With
    /// `force` the active memtable is rotated even if it has room.
    pub(crate) fn make_room_for_write(
        self: &Arc<Self>,
        state: &mut MutexGuard<'_, WriteState>,
        mut force: bool,
    ) -> Result<()> {
        if state.writers.is_empty() {
            return Err(EmberError::QueueInvariantViolation(
                "making room without a queued writer".to_string(),
            ));
        }

        let mut allow_delay = !force;
        if state.log_broken {
            tracing::info!(
                log_number = state.log_number,
                "abandoning log segment after failed append"
            );
            force = true;
        }
        loop {
            if let Some(err) = &state.bg_error {
                return Err(err.clone().into_background());
            }

            let level0 = self.versions.level0_file_count();
            if allow_delay && level0 >= self.config.l0_slowdown_writes_trigger {
                // At most one delay per write
                tracing::debug!(level0, "delaying write for level-0 pressure");
                let delay = self.config.slowdown_delay;
                MutexGuard::unlocked(state, || thread::sleep(delay));
                allow_delay = false;
            } else if !force
                && self.memtables.read().mem.approximate_memory_usage()
                    <= self.config.write_buffer_size
            {
                return Ok(());
            } else if self.memtables.read().imm.is_some() {
                tracing::info!("memtable full; waiting for the previous one to flush");
                self.background_work_finished.wait(state);
            } else if level0 >= self.config.l0_stop_writes_trigger {
                tracing::warn!(level0, "too many level-0 files; waiting for compaction");
                self.background_work_finished.wait(state);
            } else {
                self.switch_memtable(state)?;
                force = false;
                self.maybe_schedule_compaction(state);
            }
        }
    }

    /// Start a new log segment and memtable, retiring the active memtable
    /// as the immutable one.
    fn switch_memtable(&self, state: &mut WriteState) -> Result<()> {
        let number = self.versions.new_file_number();
        let path = log_file_name(&self.config.data_dir, number);
        let file = match self.env.new_writable_file(&path) {
            Ok(file) => file,
            Err(e) => {
                self.versions.reuse_file_number(number);
                tracing::error!(error = %e, path = %path.display(), "failed to create log segment");
                return Err(e);
            }
        };

        let mut retired = std::mem::replace(&mut *self.log.lock(), LogWriter::new(file, number));
        if let Err(e) = retired.close() {
            self.record_background_error(state, e);
        }
        state.log_number = number;
        state.log_broken = false;

        let mut tables = self.memtables.write();
        let full = std::mem::replace(&mut tables.mem, Arc::new(MemTable::new()));
        tracing::info!(
            log_number = number,
            entries = full.entry_count(),
            bytes = full.approximate_memory_usage(),
            "rotated memtable"
        );
        tables.imm = Some(full);
        self.has_imm.store(true, Ordering::Release);
        Ok(())
    }

    /// Schedule one background call unless one is already pending, the
    /// engine is shutting down, a background error is recorded, or there is
    /// nothing to do.
    pub(crate) fn maybe_schedule_compaction(self: &Arc<Self>, state: &mut WriteState) {
        if state.background_compaction_scheduled
            || self.shutting_down.load(Ordering::Acquire)
            || state.bg_error.is_some()
        {
            return;
        }
        if !self.has_imm.load(Ordering::Acquire)
            && !state.manual_compaction
            && !self.versions.needs_compaction()
        {
            return;
        }

        state.background_compaction_scheduled = true;
        let engine = Arc::clone(self);
        self.env.schedule(Box::new(move || engine.background_call()));
    }

    fn background_call(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if self.shutting_down.load(Ordering::Acquire) {
            tracing::debug!("skipping background work during shutdown");
        } else if state.bg_error.is_none() {
            self.background_compaction(&mut state);
        }

        state.background_compaction_scheduled = false;
        // The previous call may have produced more work (e.g. a flush that
        // pushed level 0 over its trigger)
        self.maybe_schedule_compaction(&mut state);
        self.background_work_finished.notify_all();
    }

    fn background_compaction(&self, state: &mut MutexGuard<'_, WriteState>) {
        let imm = self.memtables.read().imm.clone();
        if let Some(imm) = imm {
            let result = MutexGuard::unlocked(state, || self.compactor.flush_memtable(&imm));
            match result {
                Ok(()) => {
                    self.memtables.write().imm = None;
                    self.has_imm.store(false, Ordering::Release);
                    tracing::debug!(entries = imm.entry_count(), "immutable memtable flushed");
                }
                Err(e) => self.record_background_error(state, e),
            }
            return;
        }

        if state.manual_compaction || self.versions.needs_compaction() {
            let result = MutexGuard::unlocked(state, || self.compactor.compact());
            state.manual_compaction = false;
            if let Err(e) = result {
                self.record_background_error(state, e);
            }
        }
    }

    /// Record the first background failure. Every later write fails with it.
    pub(crate) fn record_background_error(&self, state: &mut WriteState, err: EmberError) {
        if state.bg_error.is_none() {
            tracing::error!(error = %err, "background error recorded; writes will fail");
            state.bg_error = Some(err);
            self.background_work_finished.notify_all();
        }
    }
}
