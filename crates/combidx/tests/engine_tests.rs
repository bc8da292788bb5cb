//! Integration tests across the whole engine: store, bitmap index,
//! classification, and period-pair maintenance.

use std::collections::BTreeMap;
use std::sync::Arc;

use combidx::{
    BitSet, BucketThresholds, CategoryKey, CombidxError, Cx, Engine, EngineConfig,
    FeatureDimension, FeatureKey, InMemoryHistory, InMemoryRecordStore, InMemoryUnitStates,
    IndexConfig, PairKey, PeriodHistoryProvider, PeriodInfo, PeriodPairRecord,
    PeriodPairRecordStore, PeriodSeq, UniverseShape, UnitState, category_alphabet,
};
use combidx::{CandidateId, RECORD_VERSION};
use proptest::prelude::*;

fn seq(n: u64) -> PeriodSeq {
    PeriodSeq::new(n).expect("non-zero")
}

fn small_engine() -> Engine {
    Engine::from_config(EngineConfig::new(
        UniverseShape::new(5, 2).expect("valid shape"),
        BucketThresholds::low_mid_high(4, 9).expect("valid thresholds"),
    ))
    .expect("engine loads")
}

// ===========================================================================
// 1. CLASSIFICATION OF A SMALL UNIVERSE
// ===========================================================================

#[test]
fn five_choose_two_classification_is_exact() {
    let engine = small_engine();
    let c = engine
        .classify(&UnitState::new(vec![0, 5, 10, 0, 6]))
        .expect("classify");
    let lists = c.into_id_lists();

    let mut expected = BTreeMap::new();
    expected.insert(CategoryKey::from("1:1:0"), vec![0, 3, 5, 9]);
    expected.insert(CategoryKey::from("1:0:1"), vec![1, 7]);
    expected.insert(CategoryKey::from("2:0:0"), vec![2]);
    expected.insert(CategoryKey::from("0:1:1"), vec![4, 8]);
    expected.insert(CategoryKey::from("0:2:0"), vec![6]);
    assert_eq!(lists, expected);

    // Candidate ids line up with lexicographic tuples.
    let units = |id: u32| engine.candidate(CandidateId::new(id)).expect("present").units;
    assert_eq!(units(0), vec![1, 2]);
    assert_eq!(units(6), vec![2, 5]);
    assert_eq!(units(9), vec![4, 5]);
}

#[test]
fn categories_are_drawn_from_the_alphabet() {
    let engine = small_engine();
    let c = engine
        .classify(&UnitState::new(vec![3, 3, 3, 3, 3]))
        .expect("classify");
    let alphabet = category_alphabet(2, 3);
    assert_eq!(alphabet.len(), 6);
    assert_eq!(c.len(), 1);
    assert!(c.categories().keys().all(|k| alphabet.contains(k)));
    let described = CategoryKey::from("2:0:0")
        .describe(&engine.config().thresholds)
        .expect("well formed key");
    assert_eq!(described, "low=2 mid=0 high=0");
}

// ===========================================================================
// 2. BITSET ALGEBRA AND STATIC INDEXES
// ===========================================================================

#[test]
fn small_bitset_algebra() {
    let a = BitSet::from_ids(20, [1, 3, 5]).expect("in range");
    let b = BitSet::from_ids(20, [3, 5, 7]).expect("in range");
    assert_eq!(a.and(&b).to_ids(), vec![3, 5]);
    assert_eq!(a.or(&b).to_ids(), vec![1, 3, 5, 7]);
    assert_eq!(a.and_not(&b).to_ids(), vec![1]);
}

#[test]
fn index_answers_feature_queries_on_a_realistic_universe() {
    let engine = Engine::from_config(
        EngineConfig::new(
            UniverseShape::new(35, 5).expect("valid shape"),
            BucketThresholds::low_mid_high(4, 9).expect("valid thresholds"),
        )
        .with_index(IndexConfig {
            dimensions: vec![FeatureDimension::Unit, FeatureDimension::OddCount],
            sum_band_width: 10,
            span_band_width: 5,
        }),
    )
    .expect("engine loads");
    assert_eq!(engine.store().len(), 324_632);
    assert_eq!(engine.store().slot_width(), 17);

    let index = engine.index();
    let has_7 = index
        .lookup(FeatureDimension::Unit, &FeatureKey::Value(7))
        .expect("unit 7 indexed");
    // C(34, 4) tuples contain any given unit.
    assert_eq!(has_7.cardinality(), 46_376);
    let all_odd = index
        .lookup(FeatureDimension::OddCount, &FeatureKey::Value(5))
        .expect("odd count 5 indexed");
    // 18 odd units in 1..=35: C(18, 5).
    assert_eq!(all_odd.cardinality(), 8_568);
    assert!(has_7.and(all_odd).is_subset(all_odd));

    let extended = engine
        .add_dimension(FeatureDimension::Sum)
        .expect("extend index");
    assert!(extended.shares_dimension(&index, FeatureDimension::Unit));
    assert_eq!(engine.index_handle().generation(), 1);
    let min_sum = extended
        .range(FeatureDimension::Sum, 15, 15)
        .expect("range over sums");
    assert!(min_sum.contains(0));
}

#[test]
fn ad_hoc_sets_reject_ids_outside_the_universe() {
    let engine = small_engine();
    let index = engine.index();
    assert!(matches!(
        index.create_from_ids(&[CandidateId::new(10)]),
        Err(CombidxError::Validation { .. })
    ));
    assert_eq!(index.create_full_set().not(), index.create_empty_set());
}

// ===========================================================================
// 3. PERIOD-PAIR MAINTENANCE
// ===========================================================================

struct Periods {
    history: InMemoryHistory,
    states: InMemoryUnitStates,
    records: InMemoryRecordStore,
}

fn periods(n: u64) -> Periods {
    let history = InMemoryHistory::default();
    let states = InMemoryUnitStates::new();
    let outcomes = [[1u8, 2], [3, 5], [2, 4], [1, 5], [4, 5], [2, 3]];
    for i in 0..n {
        let s = seq(i + 1);
        let idx = usize::try_from(i).expect("small");
        history.push(PeriodInfo::new(
            s,
            format!("2024{:03}", i + 1),
            outcomes[idx % outcomes.len()].to_vec(),
        ));
        let counts = (0..5u32).map(|u| (u * 3 + u32::try_from(i).expect("small")) % 12).collect();
        states.insert(s, UnitState::new(counts));
    }
    Periods {
        history,
        states,
        records: InMemoryRecordStore::new(),
    }
}

fn builder_for(engine: &Engine, p: &Periods) -> combidx::PeriodPairIndexBuilder {
    engine
        .builder(
            Arc::new(p.history.clone()),
            Arc::new(p.states.clone()),
            Arc::new(p.records.clone()),
        )
        .expect("builder")
}

#[test]
fn incremental_update_twice_keeps_one_identical_speculative_record() {
    let engine = small_engine();
    let p = periods(4);
    let mut builder = builder_for(&engine, &p);
    let cx = Cx::new();

    builder.incremental_update(&cx, 2).expect("first update");
    let first = p.records.speculative();
    builder.incremental_update(&cx, 2).expect("second update");
    let second = p.records.speculative();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    let (a, b) = (&first[0], &second[0]);
    assert_eq!(a.key(), b.key());
    assert_eq!(a.base_id, b.base_id);
    assert_eq!(a.target_id, b.target_id);
    assert_eq!(a.target_id.get(), 5);
    assert_eq!(a.categories, b.categories);
    assert_eq!(a.total_candidates, b.total_candidates);
    assert_eq!(a.created_at, b.created_at);
}

#[test]
fn full_regenerate_is_idempotent_on_unchanged_inputs() {
    let engine = small_engine();
    let p = periods(5);
    let mut builder = builder_for(&engine, &p);
    let cx = Cx::new();

    let s1 = builder.full_regenerate_from_history(&cx).expect("first");
    let r1 = p.records.records();
    let s2 = builder.full_regenerate_from_history(&cx).expect("second");
    let r2 = p.records.records();

    assert_eq!(s1.generated, 4);
    assert_eq!(s1.speculative, 1);
    assert_eq!(s2.purged, 5);
    assert_eq!(r1.len(), r2.len());
    for (a, b) in r1.iter().zip(&r2) {
        assert_eq!(a.key(), b.key());
        assert_eq!(a.categories, b.categories);
        assert_eq!(a.hit_analysis, b.hit_analysis);
    }
    let metrics = builder.metrics().snapshot();
    assert_eq!(metrics.pairs_generated_total, 8);
    assert_eq!(metrics.speculative_written_total, 2);
}

#[test]
fn records_match_direct_classification() {
    let engine = small_engine();
    let p = periods(3);
    let mut builder = builder_for(&engine, &p);
    builder
        .full_regenerate_from_history(&Cx::new())
        .expect("regenerate");

    let history = p.history.periods().expect("periods");
    let base = &history[1];
    let state = p
        .states
        .remove(base.seq)
        .expect("state for base period");
    let direct = engine.classify(&state).expect("classify");
    let hits = engine
        .score_hits(&direct, &history[2].outcome)
        .expect("score");

    let record = p
        .records
        .find(&PairKey::new(base.label.clone(), history[2].label.clone()))
        .expect("find")
        .expect("pair written");
    assert_eq!(record.categories, direct.into_id_lists());
    assert_eq!(record.hit_analysis.as_ref(), Some(&hits));
}

#[test]
fn persisted_records_survive_json() {
    let engine = small_engine();
    let p = periods(3);
    let mut builder = builder_for(&engine, &p);
    builder
        .full_regenerate_from_history(&Cx::new())
        .expect("regenerate");

    for record in p.records.records() {
        let json = record.to_json().expect("encode");
        let back = PeriodPairRecord::from_json(&json).expect("decode");
        assert_eq!(back, record);
        assert_eq!(back.version, RECORD_VERSION);
    }
}

#[test]
fn json_decoding_rejects_foreign_or_broken_records() {
    let engine = small_engine();
    let p = periods(2);
    let mut builder = builder_for(&engine, &p);
    builder
        .full_regenerate_from_history(&Cx::new())
        .expect("regenerate");
    let record = p
        .records
        .records()
        .into_iter()
        .find(|r| !r.is_speculative)
        .expect("actual pair written");

    let mut future = record.clone();
    future.version = RECORD_VERSION + 1;
    let json = serde_json::to_string(&future).expect("encode");
    assert!(matches!(
        PeriodPairRecord::from_json(&json),
        Err(CombidxError::Validation { .. })
    ));

    let mut broken = record.clone();
    if let Some(ids) = broken.categories.values_mut().next() {
        ids.pop();
    }
    broken.hit_analysis = None;
    let json = serde_json::to_string(&broken).expect("encode");
    assert!(matches!(
        PeriodPairRecord::from_json(&json),
        Err(CombidxError::InvariantViolation { .. })
    ));

    let mut value: serde_json::Value =
        serde_json::from_str(&record.to_json().expect("encode")).expect("parse");
    value["extra"] = serde_json::Value::Bool(true);
    assert!(matches!(
        PeriodPairRecord::from_json(&value.to_string()),
        Err(CombidxError::Serialization(_))
    ));

    let zero_target = record
        .to_json()
        .expect("encode")
        .replace("\"target_id\":2", "\"target_id\":0");
    assert!(PeriodPairRecord::from_json(&zero_target).is_err());
}

#[test]
fn missing_prerequisites_are_reported_per_pair() {
    let engine = small_engine();
    let p = periods(4);
    p.states.remove(seq(2));
    let mut builder = builder_for(&engine, &p);
    let summary = builder
        .full_regenerate_from_history(&Cx::new())
        .expect("batch continues past missing state");
    assert_eq!(summary.generated, 2);
    assert_eq!(summary.speculative, 1);
    assert_eq!(summary.error_count, 1);
    assert!(summary.errors.iter().all(|e| e.is_per_pair()));
    assert!(!summary.is_clean());
}

// ===========================================================================
// 4. PROPERTIES
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn classification_partitions_any_unit_state(
        counts in proptest::collection::vec(0u32..20, 8),
        low in 0u32..6,
        gap in 1u32..8,
    ) {
        let engine = Engine::from_config(EngineConfig::new(
            UniverseShape::new(8, 3).expect("valid shape"),
            BucketThresholds::low_mid_high(low, low + gap).expect("valid thresholds"),
        ))
        .expect("engine loads");
        let c = engine.classify(&UnitState::new(counts)).expect("classify");
        let total: u64 = c.categories().values().map(BitSet::cardinality).sum();
        prop_assert_eq!(total, 56);
        let alphabet = category_alphabet(3, 3);
        prop_assert!(c.categories().keys().all(|k| alphabet.contains(k)));
    }

    #[test]
    fn select_is_a_subset_of_each_predicate(unit in 1u8..=8, odd in 0u16..=3) {
        let engine = Engine::from_config(EngineConfig::new(
            UniverseShape::new(8, 3).expect("valid shape"),
            BucketThresholds::low_mid_high(2, 5).expect("valid thresholds"),
        ))
        .expect("engine loads");
        let selected = engine
            .select(&[
                (FeatureDimension::Unit, FeatureKey::Value(u16::from(unit))),
                (FeatureDimension::OddCount, FeatureKey::Value(odd)),
            ])
            .expect("select");
        for id in &selected {
            let candidate = engine.candidate(CandidateId::new(id)).expect("present");
            prop_assert!(candidate.contains(unit));
            prop_assert_eq!(u16::from(candidate.features.odd_count), odd);
        }
    }
}
