//! Write-Ahead Log (WAL) Module
//!
//! Provides durability through append-only log segments.
//!
//! ## Responsibilities
//! - Append one record per group commit before the memtable sees it
//! - CRC32 checksums for corruption detection
//! - One writer per segment; rotation starts a new segment
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Batch payload   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Batch payload   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! The payload is an encoded [`WriteBatch`](crate::batch::WriteBatch)
//! carrying its base sequence number and operations.

mod reader;
mod writer;

pub use reader::{BatchIterator, LogReader};
pub use writer::LogWriter;

/// Record header: CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 8;
