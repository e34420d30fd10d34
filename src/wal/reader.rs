//! WAL Reader
//!
//! Reads framed records back from a log segment.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use bytes::Buf;

use crate::batch::WriteBatch;
use crate::error::{EmberError, Result};

use super::HEADER_SIZE;

/// Reads records from a log segment
pub struct LogReader {
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
}

impl LogReader {
    /// Open a log segment for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next record payload.
    ///
    /// Returns `Ok(None)` at end of file, including a torn final record.
    /// A checksum mismatch is `WalCorruption`.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; HEADER_SIZE];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut header = &header[..];
        let expected_crc = header.get_u32_le();
        let len = header.get_u32_le() as usize;

        if self.position + (HEADER_SIZE + len) as u64 > self.file_len {
            tracing::warn!(offset = self.position, len, "torn record at end of log segment");
            return Ok(None);
        }

        let mut payload = vec![0u8; len];
        match self.reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::warn!(offset = self.position, "torn record at end of log segment");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(EmberError::WalCorruption(format!(
                "checksum mismatch at offset {}: expected {:#010x}, got {:#010x}",
                self.position, expected_crc, actual_crc
            )));
        }

        self.position += (HEADER_SIZE + len) as u64;
        Ok(Some(payload))
    }

    /// Read the next record as a write batch
    pub fn next_batch(&mut self) -> Result<Option<WriteBatch>> {
        match self.next_record()? {
            Some(payload) => Ok(Some(WriteBatch::decode(&payload)?)),
            None => Ok(None),
        }
    }

    /// Iterate over all decoded batches
    pub fn batches(self) -> BatchIterator {
        BatchIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset of the next record
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Iterator over the batches of a log segment
pub struct BatchIterator {
    reader: LogReader,
    done: bool,
}

impl Iterator for BatchIterator {
    type Item = Result<WriteBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
