//! Write batches
//!
//! A batch is an ordered list of puts and deletes applied atomically. When
//! applied, its operations receive consecutive sequence numbers starting at
//! the batch's base sequence, in insertion order.
//!
//! ## Log Record Payload
//! ```text
//! bincode {
//!     sequence: u64,                // base sequence of the first op
//!     ops: [ { kind, key, value? } ]  // count is the vec length
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memtable::{MemTable, SequenceNumber, ValueKind};

/// Fixed per-batch overhead counted by `approximate_size`
const BATCH_HEADER_SIZE: usize = 12;

/// Fixed per-op overhead counted by `approximate_size`
const OP_OVERHEAD: usize = 9;

/// One operation in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOp {
    pub kind: ValueKind,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// Ordered group of mutations submitted together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    sequence: SequenceNumber,
    ops: Vec<BatchOp>,
    #[serde(skip)]
    payload_bytes: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put of `key` = `value`
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        self.payload_bytes += key.len() + value.len();
        self.ops.push(BatchOp {
            kind: ValueKind::Put,
            key,
            value: Some(value),
        });
        self
    }

    /// Queue a delete of `key`
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        let key = key.into();
        self.payload_bytes += key.len();
        self.ops.push(BatchOp {
            kind: ValueKind::Delete,
            key,
            value: None,
        });
        self
    }

    /// Append every op of `other` after this batch's ops
    pub fn append(&mut self, other: &WriteBatch) {
        self.ops.extend_from_slice(&other.ops);
        self.payload_bytes += other.payload_bytes;
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.payload_bytes = 0;
        self.sequence = 0;
    }

    /// Number of operations
    pub fn count(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Base sequence number (meaningful once stamped by the write path)
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        self.sequence = sequence;
    }

    /// Bytes this batch contributes to a group commit
    pub fn approximate_size(&self) -> usize {
        BATCH_HEADER_SIZE + self.ops.len() * OP_OVERHEAD + self.payload_bytes
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Encode as a log record payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a log record payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut batch: WriteBatch = bincode::deserialize(bytes)?;
        batch.payload_bytes = batch
            .ops
            .iter()
            .map(|op| op.key.len() + op.value.as_ref().map_or(0, Vec::len))
            .sum();
        Ok(batch)
    }

    /// Apply every op to `mem`, stamping sequence numbers in order
    pub fn insert_into(&self, mem: &MemTable) -> Result<()> {
        let mut sequence = self.sequence;
        for op in &self.ops {
            let value = op.value.as_deref().unwrap_or_default();
            mem.add(sequence, op.kind, &op.key, value)?;
            sequence += 1;
        }
        Ok(())
    }
}
