//! Persisted period-pair record.
//!
//! The record is the only shape this engine hands to the persistence layer.
//! It is explicitly versioned; decoding rejects unknown fields, foreign
//! versions, and any record whose categories fail to partition the
//! universe.
//!
//! ```text
//! { version, base_period, target_period, base_id, target_id,
//!   is_speculative, categories: {key: [id..]}, total_candidates,
//!   hit_analysis?: { outcome_units, per_category_hit_counts },
//!   created_at, updated_at }
//! ```

use std::collections::BTreeMap;

use combidx_error::{CombidxError, Result};
use serde::{Deserialize, Serialize};

use crate::PeriodSeq;
use crate::period::PairKey;
use crate::thresholds::CategoryKey;

/// Current record layout version.
pub const RECORD_VERSION: u32 = 1;

/// Overlap histogram per category against a known outcome.
///
/// `per_category_hit_counts[c][h]` is the number of candidates in category
/// `c` sharing exactly `h` units with the outcome, `h` in `0..=k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HitAnalysis {
    pub outcome_units: Vec<u8>,
    pub per_category_hit_counts: BTreeMap<CategoryKey, Vec<u32>>,
}

impl HitAnalysis {
    /// Candidates matching all `k` outcome units, per category.
    pub fn full_matches(&self) -> BTreeMap<&CategoryKey, u32> {
        self.per_category_hit_counts
            .iter()
            .map(|(k, v)| (k, v.last().copied().unwrap_or(0)))
            .collect()
    }
}

/// Classification of the whole universe for one (base, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodPairRecord {
    pub version: u32,
    pub base_period: String,
    pub target_period: String,
    pub base_id: PeriodSeq,
    pub target_id: PeriodSeq,
    pub is_speculative: bool,
    pub categories: BTreeMap<CategoryKey, Vec<u32>>,
    pub total_candidates: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_analysis: Option<HitAnalysis>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PeriodPairRecord {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.base_period.clone(), self.target_period.clone())
    }

    /// Check every structural invariant of a record.
    ///
    /// Version and ordering problems are validation errors; a broken
    /// partition is an invariant violation.
    pub fn validate(&self) -> Result<()> {
        if self.version != RECORD_VERSION {
            return Err(CombidxError::validation(format!(
                "record {} has version {}, expected {RECORD_VERSION}",
                self.key(),
                self.version
            )));
        }
        if self.target_id <= self.base_id {
            return Err(CombidxError::validation(format!(
                "record {} target id {} is not after base id {}",
                self.key(),
                self.target_id,
                self.base_id
            )));
        }
        if self.is_speculative && self.hit_analysis.is_some() {
            return Err(CombidxError::validation(format!(
                "speculative record {} carries hit analysis",
                self.key()
            )));
        }
        self.validate_partition()?;
        if let Some(hits) = &self.hit_analysis {
            self.validate_hits(hits)?;
        }
        Ok(())
    }

    /// Every id in `[0, total_candidates)` appears in exactly one category,
    /// exactly once.
    pub fn validate_partition(&self) -> Result<()> {
        let n = self.total_candidates as usize;
        let mut seen = vec![0u64; n.div_ceil(64)];
        let mut covered = 0usize;
        for (key, ids) in &self.categories {
            for &id in ids {
                let i = id as usize;
                if i >= n {
                    return Err(CombidxError::invariant(format!(
                        "record {}: category {key} holds id {id} outside [0, {n})",
                        self.key()
                    )));
                }
                let (w, bit) = (i / 64, 1u64 << (i % 64));
                if seen[w] & bit != 0 {
                    return Err(CombidxError::invariant(format!(
                        "record {}: id {id} appears more than once",
                        self.key()
                    )));
                }
                seen[w] |= bit;
                covered += 1;
            }
        }
        if covered != n {
            return Err(CombidxError::invariant(format!(
                "record {}: categories cover {covered} of {n} candidates",
                self.key()
            )));
        }
        Ok(())
    }

    fn validate_hits(&self, hits: &HitAnalysis) -> Result<()> {
        let width = hits.outcome_units.len() + 1;
        for (key, ids) in &self.categories {
            let counts = hits.per_category_hit_counts.get(key).ok_or_else(|| {
                CombidxError::invariant(format!(
                    "record {}: hit analysis misses category {key}",
                    self.key()
                ))
            })?;
            let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
            if counts.len() != width || total != ids.len() as u64 {
                return Err(CombidxError::invariant(format!(
                    "record {}: hit histogram for {key} does not match its {} members",
                    self.key(),
                    ids.len()
                )));
            }
        }
        if hits.per_category_hit_counts.len() != self.categories.len() {
            return Err(CombidxError::invariant(format!(
                "record {}: hit analysis has categories the record does not",
                self.key()
            )));
        }
        Ok(())
    }

    /// Encode to JSON after validating.
    pub fn to_json(&self) -> Result<String> {
        self.validate()?;
        serde_json::to_string(self).map_err(|e| CombidxError::Serialization(e.to_string()))
    }

    /// Decode from JSON, rejecting unknown shapes and broken invariants.
    pub fn from_json(json: &str) -> Result<Self> {
        let record: Self =
            serde_json::from_str(json).map_err(|e| CombidxError::Serialization(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }
}
