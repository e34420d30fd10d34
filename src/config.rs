//! Configuration for EmberKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EmberError, Result};

/// Main configuration for an EmberKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for log segments.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 000001.log
    ///     └── 000007.log   (one per memtable generation)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Approximate bytes the active memtable may hold before rotation
    pub write_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Level-0 Flow Control
    // -------------------------------------------------------------------------
    /// Level-0 file count at which the version view asks for compaction
    pub l0_compaction_trigger: u32,

    /// Level-0 file count at which each write is delayed once
    pub l0_slowdown_writes_trigger: u32,

    /// Level-0 file count at which writes block until compaction catches up
    pub l0_stop_writes_trigger: u32,

    /// Length of the single slowdown sleep
    pub slowdown_delay: Duration,

    // -------------------------------------------------------------------------
    // Group Commit Configuration
    // -------------------------------------------------------------------------
    /// Upper bound on the bytes folded into one group
    pub max_group_commit_bytes: usize,

    /// Leading batches at or below this size only grow the group by
    /// `small_write_group_growth` bytes
    pub small_write_threshold: usize,

    /// Extra bytes a small leading batch may pull into its group
    pub small_write_group_growth: usize,

    // -------------------------------------------------------------------------
    // Filter Configuration
    // -------------------------------------------------------------------------
    /// Bits per key for the membership filter of retained runs
    pub filter_bits_per_key: usize,
}

/// Per-call write options
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// fsync the log segment before the write returns
    pub sync: bool,
}

impl WriteOptions {
    /// Options requesting a durable (synced) write
    pub fn sync() -> Self {
        Self { sync: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./emberkv_data"),
            write_buffer_size: 4 * 1024 * 1024, // 4 MB
            l0_compaction_trigger: 4,
            l0_slowdown_writes_trigger: 8,
            l0_stop_writes_trigger: 12,
            slowdown_delay: Duration::from_millis(1),
            max_group_commit_bytes: 1024 * 1024, // 1 MB
            small_write_threshold: 128 * 1024,
            small_write_group_growth: 128 * 1024,
            filter_bits_per_key: 10,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject threshold combinations the flow controller cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_size == 0 {
            return Err(EmberError::Config(
                "write_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.l0_slowdown_writes_trigger < self.l0_compaction_trigger {
            return Err(EmberError::Config(format!(
                "l0_slowdown_writes_trigger ({}) is below l0_compaction_trigger ({})",
                self.l0_slowdown_writes_trigger, self.l0_compaction_trigger
            )));
        }
        if self.l0_stop_writes_trigger < self.l0_slowdown_writes_trigger {
            return Err(EmberError::Config(format!(
                "l0_stop_writes_trigger ({}) is below l0_slowdown_writes_trigger ({})",
                self.l0_stop_writes_trigger, self.l0_slowdown_writes_trigger
            )));
        }
        if self.max_group_commit_bytes == 0 {
            return Err(EmberError::Config(
                "max_group_commit_bytes must be greater than zero".to_string(),
            ));
        }
        if self.filter_bits_per_key == 0 {
            return Err(EmberError::Config(
                "filter_bits_per_key must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all log segments)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable budget (in bytes)
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Set the level-0 compaction trigger
    pub fn l0_compaction_trigger(mut self, count: u32) -> Self {
        self.config.l0_compaction_trigger = count;
        self
    }

    /// Set the level-0 slowdown trigger
    pub fn l0_slowdown_writes_trigger(mut self, count: u32) -> Self {
        self.config.l0_slowdown_writes_trigger = count;
        self
    }

    /// Set the level-0 stop trigger
    pub fn l0_stop_writes_trigger(mut self, count: u32) -> Self {
        self.config.l0_stop_writes_trigger = count;
        self
    }

    /// Set the slowdown sleep
    pub fn slowdown_delay(mut self, delay: Duration) -> Self {
        self.config.slowdown_delay = delay;
        self
    }

    /// Set the group commit byte cap
    pub fn max_group_commit_bytes(mut self, bytes: usize) -> Self {
        self.config.max_group_commit_bytes = bytes;
        self
    }

    /// Set the small write threshold and how far such a group may grow
    pub fn small_write(mut self, threshold: usize, growth: usize) -> Self {
        self.config.small_write_threshold = threshold;
        self.config.small_write_group_growth = growth;
        self
    }

    /// Set the membership filter bits per key
    pub fn filter_bits_per_key(mut self, bits: usize) -> Self {
        self.config.filter_bits_per_key = bits;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
