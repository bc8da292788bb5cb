//! Bucket thresholds and category keys.
//!
//! Thresholds are policy, not algorithm: there is deliberately no default
//! set. `upper_bounds = [4, 9]` yields three buckets, `<= 4`, `5..=9` and
//! `>= 10`.

use std::fmt;

use combidx_error::{CombidxError, Result};
use serde::{Deserialize, Serialize};

use crate::candidate::join_counts;

/// Ascending inclusive upper bounds splitting recency counts into buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketThresholds {
    /// Inclusive upper bound of every bucket but the last.
    pub upper_bounds: Vec<u32>,
    /// Optional display names, one per bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl BucketThresholds {
    /// Build and validate thresholds from upper bounds.
    pub fn new(upper_bounds: Vec<u32>) -> Result<Self> {
        let t = Self {
            upper_bounds,
            labels: None,
        };
        t.validate()?;
        Ok(t)
    }

    /// Three-way split: `<= low_max`, `(low_max, mid_max]`, `> mid_max`.
    pub fn low_mid_high(low_max: u32, mid_max: u32) -> Result<Self> {
        let mut t = Self::new(vec![low_max, mid_max])?;
        t.labels = Some(vec!["low".to_owned(), "mid".to_owned(), "high".to_owned()]);
        Ok(t)
    }

    /// Attach display labels.
    pub fn with_labels(mut self, labels: Vec<String>) -> Result<Self> {
        self.labels = Some(labels);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.upper_bounds.is_empty() {
            return Err(CombidxError::validation(
                "bucket thresholds need at least one upper bound",
            ));
        }
        if self.upper_bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CombidxError::validation(format!(
                "bucket upper bounds {:?} must be strictly ascending",
                self.upper_bounds
            )));
        }
        if self.bucket_count() > usize::from(u8::MAX) {
            return Err(CombidxError::validation("too many buckets (max 255)"));
        }
        if let Some(labels) = &self.labels {
            if labels.len() != self.bucket_count() {
                return Err(CombidxError::validation(format!(
                    "{} labels for {} buckets",
                    labels.len(),
                    self.bucket_count()
                )));
            }
        }
        Ok(())
    }

    /// Number of buckets (`upper_bounds.len() + 1`).
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.upper_bounds.len() + 1
    }

    /// Bucket index for a recency count.
    #[inline]
    pub fn bucket_of(&self, count: u32) -> usize {
        self.upper_bounds.partition_point(|&ub| ub < count)
    }

    /// Display name of a bucket: its label, or `b{index}`.
    pub fn bucket_name(&self, bucket: usize) -> String {
        self.labels
            .as_ref()
            .and_then(|l| l.get(bucket).cloned())
            .unwrap_or_else(|| format!("b{bucket}"))
    }
}

/// Category label: per-bucket unit counts joined by `:` in bucket order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryKey(String);

impl CategoryKey {
    pub fn from_counts(counts: &[u8]) -> Self {
        Self(join_counts(counts))
    }

    /// Parse back into per-bucket counts.
    pub fn counts(&self) -> Result<Vec<u8>> {
        self.0
            .split(':')
            .map(|part| {
                part.parse::<u8>().map_err(|_| {
                    CombidxError::validation(format!("malformed category key '{}'", self.0))
                })
            })
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable form, e.g. `low=2 mid=2 high=1`.
    pub fn describe(&self, thresholds: &BucketThresholds) -> Result<String> {
        let counts = self.counts()?;
        let parts: Vec<String> = counts
            .iter()
            .enumerate()
            .map(|(b, c)| format!("{}={c}", thresholds.bucket_name(b)))
            .collect();
        Ok(parts.join(" "))
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_of_low_mid_high() {
        let t = BucketThresholds::low_mid_high(4, 9).expect("valid");
        assert_eq!(t.bucket_count(), 3);
        assert_eq!(t.bucket_of(0), 0);
        assert_eq!(t.bucket_of(4), 0);
        assert_eq!(t.bucket_of(5), 1);
        assert_eq!(t.bucket_of(9), 1);
        assert_eq!(t.bucket_of(10), 2);
        assert_eq!(t.bucket_of(u32::MAX), 2);
    }

    #[test]
    fn thresholds_reject_bad_bounds() {
        assert!(BucketThresholds::new(vec![]).is_err());
        assert!(BucketThresholds::new(vec![5, 5]).is_err());
        assert!(BucketThresholds::new(vec![9, 4]).is_err());
        let t = BucketThresholds::new(vec![4, 9]).expect("valid");
        assert!(t.with_labels(vec!["a".to_owned()]).is_err());
    }

    #[test]
    fn category_key_roundtrip_and_describe() {
        let key = CategoryKey::from_counts(&[2, 2, 1]);
        assert_eq!(key.as_str(), "2:2:1");
        assert_eq!(key.counts().expect("parse"), vec![2, 2, 1]);
        let t = BucketThresholds::low_mid_high(4, 9).expect("valid");
        assert_eq!(key.describe(&t).expect("describe"), "low=2 mid=2 high=1");
        assert!(CategoryKey::from("2:x").counts().is_err());
    }

    #[test]
    fn unlabeled_bucket_names() {
        let t = BucketThresholds::new(vec![3]).expect("valid");
        assert_eq!(t.bucket_name(0), "b0");
        assert_eq!(t.bucket_name(1), "b1");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bucket_of_is_monotone_and_respects_bounds(
                bounds in proptest::collection::btree_set(0u32..1_000, 1..6),
                a in 0u32..1_100,
                b in 0u32..1_100,
            ) {
                let t = BucketThresholds::new(bounds.into_iter().collect()).expect("ascending bounds");
                let (lo, hi) = (a.min(b), a.max(b));
                prop_assert!(t.bucket_of(lo) <= t.bucket_of(hi));
                let bucket = t.bucket_of(a);
                prop_assert!(bucket < t.bucket_count());
                if bucket < t.upper_bounds.len() {
                    prop_assert!(a <= t.upper_bounds[bucket]);
                }
                if bucket > 0 {
                    prop_assert!(a > t.upper_bounds[bucket - 1]);
                }
            }
        }
    }
}
