//! Period descriptors and pair keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PeriodSeq;

/// One known (already occurred) period from the history provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodInfo {
    pub seq: PeriodSeq,
    /// External period label, e.g. `"2024087"`.
    pub label: String,
    /// The `k` units actually drawn in this period.
    pub outcome: Vec<u8>,
}

impl PeriodInfo {
    pub fn new(seq: PeriodSeq, label: impl Into<String>, outcome: Vec<u8>) -> Self {
        Self {
            seq,
            label: label.into(),
            outcome,
        }
    }
}

/// Persistence key of a period-pair record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub base_period: String,
    pub target_period: String,
}

impl PairKey {
    pub fn new(base_period: impl Into<String>, target_period: impl Into<String>) -> Self {
        Self {
            base_period: base_period.into(),
            target_period: target_period.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.base_period, self.target_period)
    }
}

/// Increment a decimal label, keeping its zero padding.
///
/// `"2024099"` becomes `"2024100"`, `"0099"` becomes `"0100"`. Returns
/// `None` for labels that are not plain decimal digits.
pub fn increment_decimal_label(label: &str) -> Option<String> {
    if label.is_empty() || !label.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let next = label.parse::<u128>().ok()?.checked_add(1)?;
    Some(format!("{next:0width$}", width = label.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_keeps_padding() {
        assert_eq!(increment_decimal_label("2024099").as_deref(), Some("2024100"));
        assert_eq!(increment_decimal_label("0099").as_deref(), Some("0100"));
        assert_eq!(increment_decimal_label("9").as_deref(), Some("10"));
        assert_eq!(increment_decimal_label("24-001"), None);
        assert_eq!(increment_decimal_label(""), None);
    }

    #[test]
    fn pair_key_display() {
        assert_eq!(PairKey::new("1", "2").to_string(), "1->2");
    }
}
