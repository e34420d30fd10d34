//! Membership Filters
//!
//! Compact summaries of a key set that answer "definitely absent" or "maybe
//! present", letting the read path skip runs that cannot hold a key.
//!
//! ## Contract
//! - No false negatives: every key passed to `create_filter` matches
//! - False positives bounded by the bits-per-key budget (≈1% at 10 bits)
//!
//! Two policies share the contract:
//! - [`BloomFilterPolicy`]: double-hashed bit array with the probe count
//!   stored in the blob's last byte
//! - [`SetFilterPolicy`]: a general-purpose probabilistic set sized for a
//!   target false-positive rate, serialized into the blob

mod bloom;
mod set;

pub use bloom::BloomFilterPolicy;
pub use set::SetFilterPolicy;

/// Builds and queries membership filters
pub trait FilterPolicy: Send + Sync {
    /// Stable identifier persisted alongside filters
    fn name(&self) -> &'static str;

    /// Build a filter blob covering `keys`
    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8>;

    /// False only if `key` was definitely not in the filter's key set
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}
