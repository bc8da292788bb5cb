//! Fixed-width slot layout for compact candidates.
//!
//! Every candidate occupies exactly [`SlotLayout::width`] bytes:
//!
//! ```text
//! offset  size  field
//! 0       4     id (u32 LE, cross-checked on decode)
//! 4       k     units (u8 each, ascending)
//! 4+k     2     sum (u16 LE)
//! 6+k     1     span
//! 7+k     1     odd_count
//! 8+k     1     dispersion
//! 9+k     Z     zone counts (u8 each)
//! ```
//!
//! For `k = 5, Z = 3` a slot is 17 bytes.

use combidx_error::{CombidxError, Result};
use combidx_types::candidate::validate_units;
use combidx_types::{Candidate, CandidateFeatures, CandidateId, UniverseShape};

const ID_BYTES: usize = 4;
const SUM_BYTES: usize = 2;
/// span + odd_count + dispersion
const SCALAR_BYTES: usize = 3;

/// Byte offsets of every field inside a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    tuple_len: usize,
    zones: usize,
    units_at: usize,
    sum_at: usize,
    span_at: usize,
    odd_at: usize,
    dispersion_at: usize,
    zones_at: usize,
    width: usize,
}

impl SlotLayout {
    pub const fn for_shape(shape: &UniverseShape) -> Self {
        let tuple_len = shape.tuple_len as usize;
        let zones = shape.zones as usize;
        let units_at = ID_BYTES;
        let sum_at = units_at + tuple_len;
        let span_at = sum_at + SUM_BYTES;
        let odd_at = span_at + 1;
        let dispersion_at = odd_at + 1;
        let zones_at = span_at + SCALAR_BYTES;
        Self {
            tuple_len,
            zones,
            units_at,
            sum_at,
            span_at,
            odd_at,
            dispersion_at,
            zones_at,
            width: zones_at + zones,
        }
    }

    /// Total slot width in bytes.
    #[inline]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Byte range of the units inside a slot.
    #[inline]
    pub const fn units_range(&self) -> std::ops::Range<usize> {
        self.units_at..self.units_at + self.tuple_len
    }

    /// Encode `candidate` into `slot`, which must be exactly `width` bytes.
    ///
    /// Fails instead of truncating when a field does not fit its width.
    pub fn encode(&self, candidate: &Candidate, slot: &mut [u8]) -> Result<()> {
        if slot.len() != self.width {
            return Err(CombidxError::validation(format!(
                "slot buffer is {} bytes, layout needs {}",
                slot.len(),
                self.width
            )));
        }
        if candidate.units.len() != self.tuple_len {
            return Err(CombidxError::validation(format!(
                "candidate {} has {} units, layout holds {}",
                candidate.id,
                candidate.units.len(),
                self.tuple_len
            )));
        }
        if candidate.features.zones.len() != self.zones {
            return Err(CombidxError::validation(format!(
                "candidate {} has {} zone counts, layout holds {}",
                candidate.id,
                candidate.features.zones.len(),
                self.zones
            )));
        }

        let f = &candidate.features;
        slot[..ID_BYTES].copy_from_slice(&candidate.id.get().to_le_bytes());
        slot[self.units_range()].copy_from_slice(&candidate.units);
        slot[self.sum_at..self.sum_at + SUM_BYTES].copy_from_slice(&f.sum.to_le_bytes());
        slot[self.span_at] = f.span;
        slot[self.odd_at] = f.odd_count;
        slot[self.dispersion_at] = f.dispersion;
        slot[self.zones_at..self.width].copy_from_slice(&f.zones);
        Ok(())
    }

    /// Decode a slot that is expected to hold candidate `expected`.
    pub fn decode(&self, slot: &[u8], expected: CandidateId) -> Result<Candidate> {
        if slot.len() != self.width {
            return Err(CombidxError::corrupt(format!(
                "slot for {expected} is {} bytes, layout needs {}",
                slot.len(),
                self.width
            )));
        }
        let mut id_bytes = [0u8; ID_BYTES];
        id_bytes.copy_from_slice(&slot[..ID_BYTES]);
        let id = CandidateId::new(u32::from_le_bytes(id_bytes));
        if id != expected {
            return Err(CombidxError::corrupt(format!(
                "slot {expected} holds id {id}"
            )));
        }
        let mut sum_bytes = [0u8; SUM_BYTES];
        sum_bytes.copy_from_slice(&slot[self.sum_at..self.sum_at + SUM_BYTES]);

        Ok(Candidate {
            id,
            units: slot[self.units_range()].to_vec(),
            features: CandidateFeatures {
                sum: u16::from_le_bytes(sum_bytes),
                span: slot[self.span_at],
                odd_count: slot[self.odd_at],
                dispersion: slot[self.dispersion_at],
                zones: slot[self.zones_at..self.width].to_vec(),
            },
        })
    }
}

/// Validate a provider-supplied candidate against `shape`.
///
/// Units must form a valid tuple and the shipped features must be exactly
/// the derived ones; anything else is a malformed universe.
pub fn validate_candidate(shape: &UniverseShape, candidate: &Candidate) -> Result<()> {
    validate_units(shape, &candidate.units).map_err(|e| {
        CombidxError::validation(format!("candidate {}: {e}", candidate.id))
    })?;
    let derived = CandidateFeatures::derive(shape, &candidate.units);
    if derived != candidate.features {
        return Err(CombidxError::validation(format!(
            "candidate {} ships features {:?}, derived {:?}",
            candidate.id, candidate.features, derived
        )));
    }
    Ok(())
}
