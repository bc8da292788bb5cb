//! Candidate tuples and their derived features.

use combidx_error::{CombidxError, Result};
use serde::{Deserialize, Serialize};

use crate::CandidateId;
use crate::shape::UniverseShape;

/// Features derived from a candidate's units.
///
/// Every field is sized to its domain: a unit sum is at most
/// `255 * 256 / 2`, counts are bounded by `k <= 255`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateFeatures {
    pub sum: u16,
    /// `max - min` over the units.
    pub span: u8,
    /// Number of odd units.
    pub odd_count: u8,
    /// AC value: distinct positive pairwise differences minus `k - 1`.
    pub dispersion: u8,
    /// Unit count per contiguous zone.
    pub zones: Vec<u8>,
}

impl CandidateFeatures {
    /// Derive features from validated, strictly ascending units.
    #[allow(clippy::cast_possible_truncation)]
    pub fn derive(shape: &UniverseShape, units: &[u8]) -> Self {
        let sum: u32 = units.iter().map(|&u| u32::from(u)).sum();
        let span = match (units.first(), units.last()) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0,
        };
        let odd_count = units.iter().filter(|&&u| u % 2 == 1).count() as u8;

        // Differences are < 255, so a 256-bit mask holds every distinct one.
        let mut seen = [0u64; 4];
        for (i, &a) in units.iter().enumerate() {
            for &b in &units[i + 1..] {
                let d = usize::from(b.abs_diff(a));
                seen[d / 64] |= 1u64 << (d % 64);
            }
        }
        let distinct: u32 = seen.iter().map(|w| w.count_ones()).sum();
        let k_minus_one = units.len().saturating_sub(1) as u32;
        let dispersion = distinct.saturating_sub(k_minus_one) as u8;

        let mut zones = vec![0u8; usize::from(shape.zones)];
        for &u in units {
            zones[shape.zone_of(u)] += 1;
        }

        Self {
            sum: sum as u16,
            span,
            odd_count,
            dispersion,
            zones,
        }
    }

    /// Parity composition label, `odd:even`.
    pub fn parity_label(&self, tuple_len: u8) -> String {
        format!("{}:{}", self.odd_count, tuple_len - self.odd_count)
    }

    /// Zone composition label, e.g. `2:1:2`.
    pub fn zone_label(&self) -> String {
        join_counts(&self.zones)
    }
}

/// One member of the candidate universe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Strictly ascending units in `[1, M]`.
    pub units: Vec<u8>,
    pub features: CandidateFeatures,
}

impl Candidate {
    /// Build a candidate from raw units, validating them and deriving features.
    pub fn from_units(shape: &UniverseShape, id: CandidateId, units: Vec<u8>) -> Result<Self> {
        validate_units(shape, &units)?;
        let features = CandidateFeatures::derive(shape, &units);
        Ok(Self {
            id,
            units,
            features,
        })
    }

    /// Whether this candidate contains `unit`.
    pub fn contains(&self, unit: u8) -> bool {
        self.units.binary_search(&unit).is_ok()
    }
}

/// Check that `units` is a valid tuple for `shape`: length `k`, strictly
/// ascending, every unit in `[1, M]`.
pub fn validate_units(shape: &UniverseShape, units: &[u8]) -> Result<()> {
    if units.len() != usize::from(shape.tuple_len) {
        return Err(CombidxError::validation(format!(
            "tuple {units:?} has {} units, expected {}",
            units.len(),
            shape.tuple_len
        )));
    }
    if let Some(&bad) = units.iter().find(|&&u| !shape.contains_unit(u)) {
        return Err(CombidxError::validation(format!(
            "unit {bad} outside [1, {}]",
            shape.alphabet
        )));
    }
    if units.windows(2).any(|w| w[0] >= w[1]) {
        return Err(CombidxError::validation(format!(
            "tuple {units:?} is not strictly ascending"
        )));
    }
    Ok(())
}

/// Join counts with `:`, the label format shared by zone and category keys.
pub fn join_counts(counts: &[u8]) -> String {
    let mut out = String::with_capacity(counts.len() * 2);
    for (i, c) in counts.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push_str(&c.to_string());
    }
    out
}
