//! Post-hoc hit analysis against a known outcome.

use std::collections::BTreeMap;

use combidx_error::{CombidxError, Result};
use combidx_store::CompactRecordStore;
use combidx_types::candidate::validate_units;
use combidx_types::{CandidateId, HitAnalysis};
use tracing::debug;

use crate::classify::Classification;

/// 256-bit membership mask over unit values.
#[derive(Debug, Clone, Copy, Default)]
struct UnitMask([u64; 4]);

impl UnitMask {
    fn from_units(units: &[u8]) -> Self {
        let mut m = [0u64; 4];
        for &u in units {
            m[usize::from(u / 64)] |= 1u64 << (u % 64);
        }
        Self(m)
    }

    #[inline]
    fn contains(self, unit: u8) -> bool {
        self.0[usize::from(unit / 64)] & (1u64 << (unit % 64)) != 0
    }
}

/// Overlap histogram per category: entry `h` counts members sharing exactly
/// `h` units with `outcome`.
///
/// `outcome` must be a valid tuple for the store's shape. `O(N * k)`.
pub fn score_hits(
    store: &CompactRecordStore,
    classification: &Classification,
    outcome: &[u8],
) -> Result<HitAnalysis> {
    let shape = store.shape();
    validate_units(shape, outcome)?;
    if classification.total() != store.len() {
        return Err(CombidxError::validation(format!(
            "classification covers {} candidates, store holds {}",
            classification.total(),
            store.len()
        )));
    }

    let mask = UnitMask::from_units(outcome);
    let width = usize::from(shape.tuple_len) + 1;
    let mut per_category = BTreeMap::new();
    for (key, members) in classification.categories() {
        let mut histogram = vec![0u32; width];
        for raw in members {
            let units = store.units(CandidateId::new(raw)).ok_or_else(|| {
                CombidxError::corrupt(format!("category {key} names absent id {raw}"))
            })?;
            let overlap = units.iter().filter(|&&u| mask.contains(u)).count();
            histogram[overlap] += 1;
        }
        per_category.insert(key.clone(), histogram);
    }

    let analysis = HitAnalysis {
        outcome_units: outcome.to_vec(),
        per_category_hit_counts: per_category,
    };
    debug!(
        target: "combidx.classify",
        outcome = ?outcome,
        full_matches = analysis.full_matches().values().sum::<u32>(),
        "hit analysis scored"
    );
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use combidx_store::EnumeratedUniverse;
    use combidx_types::{BucketThresholds, CategoryKey, UniverseShape, UnitState};

    fn setup() -> (CompactRecordStore, Classification) {
        let shape = UniverseShape::new(5, 2).expect("valid shape");
        let store =
            CompactRecordStore::from_provider(&EnumeratedUniverse::new(shape)).expect("store loads");
        let t = BucketThresholds::low_mid_high(4, 9).expect("valid thresholds");
        let c = classify(&store, &UnitState::new(vec![0, 5, 10, 0, 6]), &t).expect("classify");
        (store, c)
    }

    #[test]
    fn histograms_count_overlap() {
        let (store, c) = setup();
        let hits = score_hits(&store, &c, &[1, 2]).expect("score");
        // "1:1:0" = {(1,2), (1,5), (2,4), (4,5)}: overlaps 2, 1, 1, 0.
        assert_eq!(
            hits.per_category_hit_counts.get(&CategoryKey::from("1:1:0")),
            Some(&vec![1, 2, 1])
        );
        // "0:1:1" = {(2,3), (3,5)}: overlaps 1, 0.
        assert_eq!(
            hits.per_category_hit_counts.get(&CategoryKey::from("0:1:1")),
            Some(&vec![1, 1, 0])
        );
        let full: u32 = hits.full_matches().values().sum();
        assert_eq!(full, 1);
    }

    #[test]
    fn histogram_totals_match_membership() {
        let (store, c) = setup();
        let hits = score_hits(&store, &c, &[3, 5]).expect("score");
        for (key, bits) in c.categories() {
            let hist = &hits.per_category_hit_counts[key];
            assert_eq!(hist.len(), 3);
            assert_eq!(u64::from(hist.iter().sum::<u32>()), bits.cardinality());
        }
    }

    #[test]
    fn invalid_outcome_is_rejected() {
        let (store, c) = setup();
        assert!(score_hits(&store, &c, &[2, 2]).is_err());
        assert!(score_hits(&store, &c, &[1, 6]).is_err());
        assert!(score_hits(&store, &c, &[1]).is_err());
    }
}
