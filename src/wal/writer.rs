//! WAL Writer
//!
//! Appends framed records to one log segment.

use bytes::{BufMut, BytesMut};

use crate::env::WritableFile;
use crate::error::{EmberError, Result};

use super::HEADER_SIZE;

/// Writes records to a single log segment.
///
/// Only the group-commit leader touches the writer of the current segment.
/// Rotation replaces the writer instead of reopening it.
pub struct LogWriter {
    dest: Box<dyn WritableFile>,
    number: u64,
    records_written: u64,
    bytes_written: u64,
    scratch: BytesMut,
}

impl LogWriter {
    /// Bind a writer to segment `number` backed by `dest`
    pub fn new(dest: Box<dyn WritableFile>, number: u64) -> Self {
        Self {
            dest,
            number,
            records_written: 0,
            bytes_written: 0,
            scratch: BytesMut::with_capacity(HEADER_SIZE),
        }
    }

    /// Append one record and push it to the OS.
    ///
    /// Header and payload go to the file in a single `append`. On error the
    /// segment may still hold a prefix of the record, so the caller must not
    /// append to it again.
    pub fn add_record(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            EmberError::WalCorruption(format!(
                "record of {} bytes exceeds the frame limit",
                payload.len()
            ))
        })?;

        self.scratch.clear();
        self.scratch.reserve(HEADER_SIZE + payload.len());
        self.scratch.put_u32_le(crc32fast::hash(payload));
        self.scratch.put_u32_le(len);
        self.scratch.put_slice(payload);

        self.dest.append(&self.scratch)?;
        self.dest.flush()?;

        self.records_written += 1;
        self.bytes_written += (HEADER_SIZE + payload.len()) as u64;
        Ok(())
    }

    /// Force the segment to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.dest.sync()?;
        Ok(())
    }

    /// Flush and release the segment
    pub fn close(&mut self) -> Result<()> {
        self.dest.close()?;
        Ok(())
    }

    /// Segment number this writer is bound to
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
