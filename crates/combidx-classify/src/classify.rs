//! Recency-bucket classification of the whole universe.
//!
//! Every unit value is mapped to a bucket once, up front. A candidate's
//! category is then the multiset of its units' buckets, encoded as a
//! mixed-radix code: bucket `b` contributes `(k + 1)^b`, so the code of a
//! candidate is the sum of `k` table lookups and decodes back to per-bucket
//! counts.

use std::collections::BTreeMap;
use std::time::Instant;

use combidx_bitmap::{BitSet, BitSetBuilder};
use combidx_error::{CombidxError, Result};
use combidx_store::CompactRecordStore;
use combidx_types::{BucketThresholds, CategoryKey, UniverseShape, UnitState};
use tracing::{Level, debug, error};

// ---------------------------------------------------------------------------
// Classification result
// ---------------------------------------------------------------------------

/// Partition of `[0, N)` into non-empty categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    categories: BTreeMap<CategoryKey, BitSet>,
    total: u32,
}

impl Classification {
    /// Wrap a category map after checking that it partitions `[0, total)`.
    pub fn from_categories(categories: BTreeMap<CategoryKey, BitSet>, total: u32) -> Result<Self> {
        check_partition(&categories, total)?;
        Ok(Self { categories, total })
    }

    pub fn categories(&self) -> &BTreeMap<CategoryKey, BitSet> {
        &self.categories
    }

    pub fn get(&self, key: &CategoryKey) -> Option<&BitSet> {
        self.categories.get(key)
    }

    /// Universe size `N`.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Number of non-empty categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category holding candidate `id`.
    pub fn category_of(&self, id: u32) -> Option<&CategoryKey> {
        self.categories
            .iter()
            .find_map(|(key, bits)| bits.contains(id).then_some(key))
    }

    /// Ascending id lists per category, the persisted form.
    pub fn into_id_lists(self) -> BTreeMap<CategoryKey, Vec<u32>> {
        self.categories
            .into_iter()
            .map(|(key, bits)| (key, bits.to_ids()))
            .collect()
    }
}

fn check_partition(categories: &BTreeMap<CategoryKey, BitSet>, total: u32) -> Result<()> {
    let mut union = BitSet::empty(total);
    let mut sum = 0u64;
    for (key, bits) in categories {
        if bits.len() != total {
            return Err(CombidxError::invariant(format!(
                "category {key} ranges over {} ids, universe has {total}",
                bits.len()
            )));
        }
        sum += bits.cardinality();
        union = union.or(bits);
    }
    if sum != u64::from(total) {
        return Err(CombidxError::invariant(format!(
            "category sizes sum to {sum}, universe has {total}"
        )));
    }
    if union != BitSet::full(total) {
        return Err(CombidxError::invariant(format!(
            "categories cover {} of {total} ids",
            union.cardinality()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bucket table
// ---------------------------------------------------------------------------

/// Per-unit mixed-radix weights for one (unit state, thresholds) input.
#[derive(Debug, Clone)]
struct BucketTable {
    /// `weights[u]` for unit `u`; slot 0 is unused.
    weights: Vec<u64>,
    /// `(k + 1)` as the radix of every digit.
    radix: u64,
    buckets: usize,
}

impl BucketTable {
    fn new(shape: &UniverseShape, state: &UnitState, thresholds: &BucketThresholds) -> Result<Self> {
        let buckets = thresholds.bucket_count();
        let radix = u64::from(shape.tuple_len) + 1;
        let exponent = u32::try_from(buckets - 1)
            .map_err(|_| CombidxError::validation("bucket count does not fit u32"))?;
        let top = radix.checked_pow(exponent).ok_or_else(|| {
            CombidxError::validation(format!(
                "{buckets} buckets with k = {} overflow the category code",
                shape.tuple_len
            ))
        })?;
        // The largest code is k * top; it must fit as well.
        top.checked_mul(radix - 1).ok_or_else(|| {
            CombidxError::validation(format!(
                "{buckets} buckets with k = {} overflow the category code",
                shape.tuple_len
            ))
        })?;

        let mut weights = vec![0u64; usize::from(shape.alphabet) + 1];
        for unit in 1..=shape.alphabet {
            let bucket = thresholds.bucket_of(state.count(unit));
            // bucket <= buckets - 1, checked above.
            #[allow(clippy::cast_possible_truncation)]
            let w = radix.pow(bucket as u32);
            weights[usize::from(unit)] = w;
        }
        Ok(Self {
            weights,
            radix,
            buckets,
        })
    }

    #[inline]
    fn code(&self, units: &[u8]) -> u64 {
        units
            .iter()
            .map(|&u| self.weights.get(usize::from(u)).copied().unwrap_or(1))
            .sum()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key(&self, mut code: u64) -> CategoryKey {
        let mut counts = Vec::with_capacity(self.buckets);
        for _ in 0..self.buckets {
            // Each digit is at most k <= 255.
            counts.push((code % self.radix) as u8);
            code /= self.radix;
        }
        CategoryKey::from_counts(&counts)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Classify every candidate by how its units fall into recency buckets.
///
/// Deterministic for a given input, `O(N * k)`. A unit missing from
/// `state` counts as fresh (recency 0). The output is checked to partition
/// the universe; a failed check is an invariant violation.
pub fn classify(
    store: &CompactRecordStore,
    state: &UnitState,
    thresholds: &BucketThresholds,
) -> Result<Classification> {
    thresholds.validate()?;
    let shape = store.shape();
    let n = store.len();
    let span = tracing::span!(
        target: "combidx.classify",
        Level::DEBUG,
        "classify",
        candidates = n,
        buckets = thresholds.bucket_count()
    );
    let _guard = span.enter();
    let started = Instant::now();

    if state.len() > usize::from(shape.alphabet) {
        debug!(
            target: "combidx.classify",
            entries = state.len(),
            alphabet = shape.alphabet,
            "unit state has entries beyond the alphabet; ignoring them"
        );
    }

    let table = BucketTable::new(shape, state, thresholds)?;
    let mut by_code: BTreeMap<u64, BitSetBuilder> = BTreeMap::new();
    for (id, units) in store.iter_units() {
        by_code
            .entry(table.code(units))
            .or_insert_with(|| BitSetBuilder::new(n))
            .insert(id.get())?;
    }

    let categories: BTreeMap<CategoryKey, BitSet> = by_code
        .into_iter()
        .map(|(code, bits)| (table.key(code), bits.freeze()))
        .collect();

    if let Err(err) = check_partition(&categories, n) {
        error!(target: "combidx.classify", %err, "classification failed partition check");
        return Err(err);
    }
    debug!(
        target: "combidx.classify",
        categories = categories.len(),
        elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "classification complete"
    );
    Ok(Classification {
        categories,
        total: n,
    })
}

/// Every category key possible for `k` units over `buckets` buckets,
/// ascending. There are `C(k + buckets - 1, buckets - 1)` of them.
pub fn category_alphabet(tuple_len: u8, buckets: usize) -> Vec<CategoryKey> {
    fn fill(remaining: u8, slot: usize, counts: &mut Vec<u8>, out: &mut Vec<CategoryKey>) {
        if slot + 1 == counts.len() {
            counts[slot] = remaining;
            out.push(CategoryKey::from_counts(counts));
            return;
        }
        for c in 0..=remaining {
            counts[slot] = c;
            fill(remaining - c, slot + 1, counts, out);
        }
    }

    if buckets == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    fill(tuple_len, 0, &mut vec![0; buckets], &mut out);
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use combidx_store::EnumeratedUniverse;
    use combidx_types::binomial;
    use proptest::prelude::*;

    fn store(alphabet: u8, k: u8) -> CompactRecordStore {
        let shape = UniverseShape::new(alphabet, k).expect("valid shape");
        CompactRecordStore::from_provider(&EnumeratedUniverse::new(shape)).expect("store loads")
    }

    fn ids(c: &Classification, key: &str) -> Vec<u32> {
        c.get(&CategoryKey::from(key))
            .map(BitSet::to_ids)
            .unwrap_or_default()
    }

    #[test]
    fn five_choose_two_exact_membership() {
        let s = store(5, 2);
        let state = UnitState::new(vec![0, 5, 10, 0, 6]);
        let t = BucketThresholds::low_mid_high(4, 9).expect("valid thresholds");
        let c = classify(&s, &state, &t).expect("classify");

        assert_eq!(c.total(), 10);
        assert_eq!(c.len(), 5);
        assert_eq!(ids(&c, "1:1:0"), vec![0, 3, 5, 9]);
        assert_eq!(ids(&c, "1:0:1"), vec![1, 7]);
        assert_eq!(ids(&c, "2:0:0"), vec![2]);
        assert_eq!(ids(&c, "0:1:1"), vec![4, 8]);
        assert_eq!(ids(&c, "0:2:0"), vec![6]);
        assert_eq!(c.category_of(7).map(CategoryKey::as_str), Some("1:0:1"));
    }

    #[test]
    fn missing_units_are_fresh() {
        let s = store(5, 2);
        let t = BucketThresholds::new(vec![4, 9]).expect("valid thresholds");
        let c = classify(&s, &UnitState::default(), &t).expect("classify");
        assert_eq!(c.len(), 1);
        assert_eq!(ids(&c, "2:0:0").len(), 10);

        // Only unit 1 has an entry; units 2..=5 read as 0.
        let partial = classify(&s, &UnitState::new(vec![12]), &t).expect("classify");
        assert_eq!(ids(&partial, "1:0:1"), vec![0, 1, 2, 3]);
        assert_eq!(ids(&partial, "2:0:0").len(), 6);
    }

    #[test]
    fn threshold_boundaries_are_inclusive_upper() {
        let s = store(3, 1);
        let t = BucketThresholds::new(vec![4, 9]).expect("valid thresholds");
        let c = classify(&s, &UnitState::new(vec![4, 9, 10]), &t).expect("classify");
        assert_eq!(ids(&c, "1:0:0"), vec![0]);
        assert_eq!(ids(&c, "0:1:0"), vec![1]);
        assert_eq!(ids(&c, "0:0:1"), vec![2]);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let s = store(5, 2);
        let bad = BucketThresholds {
            upper_bounds: vec![9, 4],
            labels: None,
        };
        assert!(matches!(
            classify(&s, &UnitState::default(), &bad),
            Err(CombidxError::Validation { .. })
        ));
    }

    #[test]
    fn from_categories_detects_overlap_and_gaps() {
        let mut overlap = BTreeMap::new();
        overlap.insert(CategoryKey::from("1:0"), BitSet::from_ids(4, [0, 1, 2]).expect("ids"));
        overlap.insert(CategoryKey::from("0:1"), BitSet::from_ids(4, [2, 3]).expect("ids"));
        assert!(matches!(
            Classification::from_categories(overlap, 4),
            Err(CombidxError::InvariantViolation { .. })
        ));

        let mut gap = BTreeMap::new();
        gap.insert(CategoryKey::from("1:0"), BitSet::from_ids(4, [0, 1]).expect("ids"));
        assert!(Classification::from_categories(gap, 4).is_err());
    }

    #[test]
    fn alphabet_counts_compositions() {
        let keys = category_alphabet(2, 3);
        let names: Vec<&str> = keys.iter().map(CategoryKey::as_str).collect();
        assert_eq!(
            names,
            vec!["0:0:2", "0:1:1", "0:2:0", "1:0:1", "1:1:0", "2:0:0"]
        );
        let big = category_alphabet(5, 3);
        assert_eq!(big.len() as u64, binomial(7, 2).expect("small"));
        assert!(category_alphabet(3, 0).is_empty());
    }

    #[test]
    fn into_id_lists_keeps_order() {
        let s = store(5, 2);
        let t = BucketThresholds::low_mid_high(4, 9).expect("valid thresholds");
        let lists = classify(&s, &UnitState::new(vec![0, 5, 10, 0, 6]), &t)
            .expect("classify")
            .into_id_lists();
        assert_eq!(lists.get(&CategoryKey::from("1:1:0")), Some(&vec![0, 3, 5, 9]));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_classification_partitions_universe(
            counts in proptest::collection::vec(0u32..30, 0..12),
            low in 0u32..10,
            gap in 1u32..10,
        ) {
            let s = store(10, 3);
            let t = BucketThresholds::new(vec![low, low + gap]).expect("ascending");
            let c = classify(&s, &UnitState::new(counts), &t).expect("classify");
            let alphabet = category_alphabet(3, 3);
            let mut total = 0u64;
            for (key, bits) in c.categories() {
                prop_assert!(alphabet.contains(key));
                prop_assert!(!bits.is_empty());
                total += bits.cardinality();
            }
            prop_assert_eq!(total, 120);
        }

        #[test]
        fn prop_classify_is_deterministic(counts in proptest::collection::vec(0u32..20, 8)) {
            let s = store(8, 2);
            let t = BucketThresholds::new(vec![3, 7, 12]).expect("ascending");
            let state = UnitState::new(counts);
            let a = classify(&s, &state, &t).expect("classify");
            let b = classify(&s, &state, &t).expect("classify");
            prop_assert_eq!(a, b);
        }
    }
}
