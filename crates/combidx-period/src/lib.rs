//! Period-pair classification index.
//!
//! [`PeriodPairIndexBuilder`] keeps one classification record per
//! consecutive pair of known periods, plus exactly one speculative record
//! for the period that has not occurred yet. Inputs arrive through
//! [`PeriodHistoryProvider`] and [`UnitStateProvider`]; records leave
//! through [`PeriodPairRecordStore`].

pub mod builder;
pub mod metrics;
pub mod providers;

pub use builder::{BatchSummary, BuilderConfig, PeriodPairIndexBuilder};
pub use metrics::{BuilderMetrics, BuilderMetricsSnapshot};
pub use providers::{
    InMemoryHistory, InMemoryRecordStore, InMemoryUnitStates, PeriodHistoryProvider,
    PeriodPairRecordStore, UnitStateProvider,
};
