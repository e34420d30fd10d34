//! Versioned keys
//!
//! A user key paired with the sequence number and mutation kind that wrote it.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sequence numbers are global to a store instance and never reused
pub type SequenceNumber = u64;

/// Largest sequence number usable as a snapshot
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = u64::MAX >> 8;

/// Kind of mutation recorded for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    Delete = 0,
    Put = 1,
}

/// User key + sequence number + kind.
///
/// Ordered by user key ascending, then sequence descending, then kind
/// descending, so the newest version of a key sorts first.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VersionedKey {
    pub user_key: Vec<u8>,
    pub sequence: SequenceNumber,
    pub kind: ValueKind,
}

impl VersionedKey {
    pub fn new(user_key: impl Into<Vec<u8>>, sequence: SequenceNumber, kind: ValueKind) -> Self {
        Self {
            user_key: user_key.into(),
            sequence,
            kind,
        }
    }

    /// Probe that sorts before every version of `user_key` visible at
    /// `snapshot`
    pub fn lookup(user_key: &[u8], snapshot: SequenceNumber) -> Self {
        Self::new(user_key, snapshot, ValueKind::Put)
    }
}

impl Ord for VersionedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.kind.cmp(&self.kind))
    }
}

impl PartialOrd for VersionedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for VersionedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' @ {} : {:?}",
            String::from_utf8_lossy(&self.user_key),
            self.sequence,
            self.kind
        )
    }
}
