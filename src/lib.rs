//! # EmberKV
//!
//! The write path of a log-structured merge key-value store:
//! - Lock-free-read skip list memtable with versioned keys
//! - Write-ahead log with checksummed records
//! - Group commit: many concurrent writers, one log append per group
//! - Level-0 flow control (slowdown, stop, memtable rotation)
//! - Pluggable flush/compaction backend with membership filters
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Concurrent Writers (put/write)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ admission lock
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │           Writer Queue → Leader builds a group              │
//! │       make_room_for_write (slowdown / stop / rotate)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ lock released
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │ (SkipList)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │ rotate
//!                                   ▼
//!                           ┌─────────────┐
//!                           │  Compactor  │
//!                           │ (background)│
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod memtable;
pub mod batch;
pub mod wal;
pub mod env;
pub mod version;
pub mod filter;
pub mod compaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EmberError, Result};
pub use config::{Config, WriteOptions};
pub use batch::WriteBatch;
pub use engine::{Engine, EngineBuilder};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
