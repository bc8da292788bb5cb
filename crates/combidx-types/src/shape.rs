//! Combinatorial shape of the candidate universe.
//!
//! A shape fixes the alphabet size `M`, the tuple length `k`, and the number
//! of contiguous zones the alphabet is cut into for the zone-composition
//! feature. The shape is immutable for an engine's lifetime; every slot width
//! and index dimension is derived from it.

use combidx_error::{CombidxError, Result};
use serde::{Deserialize, Serialize};

/// Default number of zones for the zone-composition feature.
pub const DEFAULT_ZONES: u8 = 3;

/// Shape of the universe: `C(alphabet, tuple_len)` candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniverseShape {
    /// Alphabet size `M`; units are drawn from `[1, M]`.
    pub alphabet: u8,
    /// Tuple length `k`.
    pub tuple_len: u8,
    /// Number of contiguous zones over `[1, M]`.
    #[serde(default = "default_zones")]
    pub zones: u8,
}

const fn default_zones() -> u8 {
    DEFAULT_ZONES
}

impl UniverseShape {
    /// Build a shape with the default zone count, validating it.
    pub fn new(alphabet: u8, tuple_len: u8) -> Result<Self> {
        Self::with_zones(alphabet, tuple_len, DEFAULT_ZONES.min(alphabet.max(1)))
    }

    /// Build a shape with an explicit zone count, validating it.
    pub fn with_zones(alphabet: u8, tuple_len: u8, zones: u8) -> Result<Self> {
        let shape = Self {
            alphabet,
            tuple_len,
            zones,
        };
        shape.validate()?;
        Ok(shape)
    }

    /// Check domain limits. Slot fields are sized from these bounds.
    pub fn validate(&self) -> Result<()> {
        if self.alphabet == 0 {
            return Err(CombidxError::validation("alphabet must be at least 1"));
        }
        if self.tuple_len == 0 || self.tuple_len > self.alphabet {
            return Err(CombidxError::validation(format!(
                "tuple length {} must be in [1, {}]",
                self.tuple_len, self.alphabet
            )));
        }
        if self.zones == 0 || self.zones > self.alphabet {
            return Err(CombidxError::validation(format!(
                "zone count {} must be in [1, {}]",
                self.zones, self.alphabet
            )));
        }
        self.size().map(|_| ())
    }

    /// Number of candidates `N = C(M, k)`.
    ///
    /// Fails if `N` does not fit a `u32` candidate id.
    pub fn size(&self) -> Result<u32> {
        let n = binomial(u64::from(self.alphabet), u64::from(self.tuple_len))?;
        u32::try_from(n).map_err(|_| {
            CombidxError::validation(format!(
                "universe C({}, {}) = {n} exceeds the u32 id space",
                self.alphabet, self.tuple_len
            ))
        })
    }

    /// Width of each zone; the last zone may be shorter.
    #[inline]
    pub const fn zone_width(&self) -> u8 {
        self.alphabet.div_ceil(self.zones)
    }

    /// Zone index of a unit in `[1, M]`.
    #[inline]
    pub const fn zone_of(&self, unit: u8) -> usize {
        (unit.saturating_sub(1) / self.zone_width()) as usize
    }

    /// Whether `unit` lies in `[1, M]`.
    #[inline]
    pub const fn contains_unit(&self, unit: u8) -> bool {
        unit >= 1 && unit <= self.alphabet
    }

    /// Largest possible unit sum, used to size the sum field.
    pub fn max_sum(&self) -> u32 {
        let k = u32::from(self.tuple_len);
        let m = u32::from(self.alphabet);
        // (M-k+1) + ... + M
        k * (2 * m - k + 1) / 2
    }
}

/// Checked binomial coefficient `C(n, r)`.
pub fn binomial(n: u64, r: u64) -> Result<u64> {
    if r > n {
        return Ok(0);
    }
    let r = r.min(n - r);
    let mut acc: u64 = 1;
    for i in 0..r {
        // acc * (n - i) / (i + 1) stays integral at every step.
        acc = acc
            .checked_mul(n - i)
            .map(|v| v / (i + 1))
            .ok_or_else(|| CombidxError::validation(format!("C({n}, {r}) overflows u64")))?;
    }
    Ok(acc)
}
