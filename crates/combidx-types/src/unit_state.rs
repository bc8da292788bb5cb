//! Per-unit recency signal for one reference period.
//!
//! The engine never derives unit state from history; callers compute it
//! and hand it in. Unit `u` reads slot `u - 1`. A unit with no slot is
//! treated as fresh (count 0).

use serde::{Deserialize, Serialize};

/// Recency ("missing") counts indexed by unit value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitState {
    counts: Vec<u32>,
}

impl UnitState {
    /// Wrap counts where `counts[u - 1]` belongs to unit `u`.
    pub fn new(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    /// Recency count for `unit`; 0 when the unit has no entry.
    #[inline]
    pub fn count(&self, unit: u8) -> u32 {
        usize::from(unit)
            .checked_sub(1)
            .and_then(|i| self.counts.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Number of units with an explicit entry.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.counts
    }
}

impl From<Vec<u32>> for UnitState {
    fn from(counts: Vec<u32>) -> Self {
        Self::new(counts)
    }
}
