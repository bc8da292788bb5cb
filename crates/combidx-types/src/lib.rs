pub mod candidate;
pub mod cx;
pub mod period;
pub mod record;
pub mod shape;
pub mod thresholds;
pub mod unit_state;

pub use candidate::{Candidate, CandidateFeatures};
pub use cx::{CancelReason, CancelState, Cx};
pub use period::{PairKey, PeriodInfo};
pub use record::{HitAnalysis, PeriodPairRecord, RECORD_VERSION};
pub use shape::{UniverseShape, binomial};
pub use thresholds::{BucketThresholds, CategoryKey};
pub use unit_state::UnitState;

use std::fmt;
use std::num::NonZeroU64;

/// Dense id of a candidate in the universe.
///
/// Ids run over `[0, N)` in enumeration order and never change for the
/// lifetime of an engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CandidateId(u32);

impl CandidateId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id as a slot / bit position.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CandidateId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Monotonic sequence number of a period.
///
/// Sequence numbers are 1-based. Zero is unrepresentable, so a speculative
/// target can never be written with a sentinel id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct PeriodSeq(NonZeroU64);

impl PeriodSeq {
    /// The first period.
    pub const ONE: Self = Self(NonZeroU64::MIN);

    /// Create a sequence number from a raw u64.
    ///
    /// Returns `None` if `n` is 0.
    #[inline]
    pub const fn new(n: u64) -> Option<Self> {
        match NonZeroU64::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// The id the next (not yet occurred) period will carry.
    ///
    /// Returns `None` only on `u64` overflow.
    #[inline]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for PeriodSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for PeriodSeq {
    type Error = InvalidPeriodSeq;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidPeriodSeq)
    }
}

/// Error returned when attempting to create a `PeriodSeq` from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPeriodSeq;

impl fmt::Display for InvalidPeriodSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("period sequence cannot be zero")
    }
}

impl std::error::Error for InvalidPeriodSeq {}

/// Unix epoch milliseconds for record timestamps.
#[must_use]
pub fn now_unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
