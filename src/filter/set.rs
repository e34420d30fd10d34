//! Probabilistic-set filter
//!
//! Wraps the general-purpose [`bloomfilter::Bloom`] set, sized from the key
//! count and the false-positive rate the bit budget buys. The set's bitmap,
//! probe count and SipHash keys are serialized into the filter blob:
//!
//! ```text
//! ┌────────┬───────────┬──────────────────┬───────────────────┐
//! │ k (4)  │ bits (8)  │ sip keys (4 x 8) │ bitmap (⌈bits/8⌉) │
//! └────────┴───────────┴──────────────────┴───────────────────┘
//! ```

use bloomfilter::Bloom;
use bytes::{Buf, BufMut};

use super::FilterPolicy;

/// k (4) + bits (8) + sip keys (32)
const SET_HEADER_SIZE: usize = 44;

/// Smallest bitmap; tiny key sets otherwise see high false-positive rates
const MIN_BITMAP_BYTES: usize = 8;

/// Probe counts above this are treated as malformed
const MAX_PROBES: u32 = 255;

/// Filter policy backed by a probabilistic set
#[derive(Debug, Clone)]
pub struct SetFilterPolicy {
    bits_per_key: usize,
}

impl SetFilterPolicy {
    pub fn new(bits_per_key: usize) -> Self {
        Self { bits_per_key }
    }

    /// Rate an optimally configured set reaches at this bit budget:
    /// p = e^(−b·ln²2)
    pub fn target_false_positive_rate(&self) -> f64 {
        let ln2 = std::f64::consts::LN_2;
        (-(self.bits_per_key as f64) * ln2 * ln2).exp()
    }

    /// Bitmap bytes needed for `items` keys at the target rate
    fn bitmap_bytes(&self, items: usize) -> usize {
        let ln2 = std::f64::consts::LN_2;
        let bits = (items as f64) * -self.target_false_positive_rate().ln() / (ln2 * ln2);
        ((bits / 8.0).ceil() as usize).max(MIN_BITMAP_BYTES)
    }
}

impl Default for SetFilterPolicy {
    fn default() -> Self {
        Self::new(10)
    }
}

fn encode(set: &Bloom<[u8]>) -> Vec<u8> {
    let bitmap = set.bitmap();
    let mut out = Vec::with_capacity(SET_HEADER_SIZE + bitmap.len());
    out.put_u32_le(set.number_of_hash_functions());
    out.put_u64_le(set.number_of_bits());
    for (k0, k1) in set.sip_keys() {
        out.put_u64_le(k0);
        out.put_u64_le(k1);
    }
    out.extend_from_slice(&bitmap);
    out
}

/// Rebuild a set from `encode` output; `None` if malformed
fn decode(mut blob: &[u8]) -> Option<Bloom<[u8]>> {
    if blob.len() < SET_HEADER_SIZE {
        return None;
    }
    let probes = blob.get_u32_le();
    let bits = blob.get_u64_le();
    let sip_keys = [
        (blob.get_u64_le(), blob.get_u64_le()),
        (blob.get_u64_le(), blob.get_u64_le()),
    ];

    let needed = bits.checked_add(7)? / 8;
    if bits == 0 || probes == 0 || probes > MAX_PROBES || (blob.len() as u64) < needed {
        return None;
    }
    Some(Bloom::from_existing(blob, bits, probes, sip_keys))
}

impl FilterPolicy for SetFilterPolicy {
    fn name(&self) -> &'static str {
        "emberkv.ProbabilisticSetFilter"
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let items = keys.len().max(1);
        let mut set: Bloom<[u8]> = Bloom::new(self.bitmap_bytes(items), items);
        for key in keys {
            set.set(key);
        }
        encode(&set)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        match decode(filter) {
            Some(set) => set.check(key),
            None => false,
        }
    }
}
