//! Double-hashing bloom filter
//!
//! ```text
//! ┌──────────────────────────────┬───────┐
//! │ bit array (⌈n·bits_per_key⌉) │ k (1) │
//! └──────────────────────────────┴───────┘
//! ```
//! One 32-bit hash per key; the k probes are `h, h+δ, h+2δ, …` where δ is
//! `h` rotated right by 17 bits.

use xxhash_rust::xxh32::xxh32;

use super::FilterPolicy;

const HASH_SEED: u32 = 0xbc9f_1d34;

/// Smallest bit array; tiny key sets otherwise see high false-positive rates
const MIN_BITS: usize = 64;

/// Probe counts above this are reserved for future encodings
const MAX_PROBES: u8 = 30;

/// Bloom filter policy with `bits_per_key` bits of budget per key
#[derive(Debug, Clone)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    probes: u8,
}

impl BloomFilterPolicy {
    pub fn new(bits_per_key: usize) -> Self {
        // k = bits_per_key · ln 2 minimizes the false-positive rate
        let probes = (bits_per_key * 69 / 100).clamp(1, MAX_PROBES as usize) as u8;
        Self {
            bits_per_key,
            probes,
        }
    }

    pub fn bits_per_key(&self) -> usize {
        self.bits_per_key
    }

    pub fn probes(&self) -> u8 {
        self.probes
    }
}

impl Default for BloomFilterPolicy {
    fn default() -> Self {
        Self::new(10)
    }
}

fn bloom_hash(key: &[u8]) -> u32 {
    xxh32(key, HASH_SEED)
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "emberkv.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let bits = (keys.len() * self.bits_per_key).max(MIN_BITS);
        let bytes = (bits + 7) / 8;
        let bits = bytes * 8;

        let mut filter = vec![0u8; bytes + 1];
        filter[bytes] = self.probes;

        for key in keys {
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.probes {
                let bit = h as usize % bits;
                filter[bit / 8] |= 1 << (bit % 8);
                h = h.wrapping_add(delta);
            }
        }
        filter
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }
        let bytes = filter.len() - 1;
        let bits = bytes * 8;
        let probes = filter[bytes];
        if probes > MAX_PROBES {
            return true;
        }

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..probes {
            let bit = h as usize % bits;
            if (filter[bit / 8] & (1 << (bit % 8))) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}
