//! Period-side collaborators of the builder, plus in-memory implementations.
//!
//! The engine never owns period history, unit state, or record storage; it
//! reads the first two and writes the third through these traits. The
//! in-memory implementations share their state between clones, so a test or
//! an orchestrator can keep a handle while the builder holds another.

use std::collections::BTreeMap;
use std::sync::Arc;

use combidx_error::Result;
use combidx_types::period::increment_decimal_label;
use combidx_types::{PairKey, PeriodInfo, PeriodPairRecord, PeriodSeq, UnitState};
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Known periods, oldest first.
pub trait PeriodHistoryProvider: Send + Sync {
    /// Every known period in ascending id order.
    fn periods(&self) -> Result<Vec<PeriodInfo>>;

    /// Label for the period after `last`, which has not occurred yet.
    ///
    /// `None` makes the builder fall back to the next id in decimal.
    fn next_label(&self, last: &PeriodInfo) -> Option<String> {
        increment_decimal_label(&last.label)
    }
}

/// Per-unit recency signal anchored at a base period.
pub trait UnitStateProvider: Send + Sync {
    /// `Ok(None)` when no state is recorded for `base`.
    fn unit_state(&self, base: &PeriodInfo) -> Result<Option<UnitState>>;
}

/// Sink for period-pair records, keyed by `(base_period, target_period)`.
pub trait PeriodPairRecordStore: Send + Sync {
    /// Insert or replace the record with the same key.
    fn upsert(&self, record: PeriodPairRecord) -> Result<()>;

    /// Delete every record matching `predicate`; returns how many went.
    fn delete_where(&self, predicate: &dyn Fn(&PeriodPairRecord) -> bool) -> Result<usize>;

    fn find(&self, key: &PairKey) -> Result<Option<PeriodPairRecord>>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Period history held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    periods: Arc<RwLock<Vec<PeriodInfo>>>,
}

impl InMemoryHistory {
    pub fn new(periods: Vec<PeriodInfo>) -> Self {
        Self {
            periods: Arc::new(RwLock::new(periods)),
        }
    }

    /// Append a newly occurred period.
    pub fn push(&self, period: PeriodInfo) {
        self.periods.write().push(period);
    }

    pub fn len(&self) -> usize {
        self.periods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.read().is_empty()
    }
}

impl PeriodHistoryProvider for InMemoryHistory {
    fn periods(&self) -> Result<Vec<PeriodInfo>> {
        Ok(self.periods.read().clone())
    }
}

/// Unit states keyed by the period they are anchored at.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUnitStates {
    states: Arc<RwLock<BTreeMap<PeriodSeq, UnitState>>>,
}

impl InMemoryUnitStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, base: PeriodSeq, state: UnitState) {
        self.states.write().insert(base, state);
    }

    pub fn remove(&self, base: PeriodSeq) -> Option<UnitState> {
        self.states.write().remove(&base)
    }
}

impl UnitStateProvider for InMemoryUnitStates {
    fn unit_state(&self, base: &PeriodInfo) -> Result<Option<UnitState>> {
        Ok(self.states.read().get(&base.seq).cloned())
    }
}

/// Record store held in memory, ordered by key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<PairKey, PeriodPairRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record, ordered by key.
    pub fn records(&self) -> Vec<PeriodPairRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Stored speculative records.
    pub fn speculative(&self) -> Vec<PeriodPairRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.is_speculative)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl PeriodPairRecordStore for InMemoryRecordStore {
    fn upsert(&self, record: PeriodPairRecord) -> Result<()> {
        self.records.write().insert(record.key(), record);
        Ok(())
    }

    fn delete_where(&self, predicate: &dyn Fn(&PeriodPairRecord) -> bool) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !predicate(r));
        Ok(before - records.len())
    }

    fn find(&self, key: &PairKey) -> Result<Option<PeriodPairRecord>> {
        Ok(self.records.read().get(key).cloned())
    }
}
