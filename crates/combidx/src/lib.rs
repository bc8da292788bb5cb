//! Public API facade for combidx.
//!
//! An [`Engine`] owns one immutable candidate universe and its published
//! bitmap index. Classification runs directly against it; period-pair
//! maintenance goes through a [`PeriodPairIndexBuilder`] obtained from
//! [`Engine::builder`]. The member crates are re-exported for callers that
//! need the lower layers.

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::Engine;

pub use combidx_bitmap::{
    BitSet, BitmapIndex, FeatureDimension, FeatureKey, IndexConfig, IndexHandle,
};
pub use combidx_classify::{Classification, category_alphabet};
pub use combidx_error::{CombidxError, ErrorKind, Result};
pub use combidx_period::{
    BatchSummary, BuilderConfig, BuilderMetricsSnapshot, InMemoryHistory, InMemoryRecordStore,
    InMemoryUnitStates, PeriodHistoryProvider, PeriodPairIndexBuilder, PeriodPairRecordStore,
    UnitStateProvider,
};
pub use combidx_store::{CandidateUniverseProvider, CompactRecordStore, EnumeratedUniverse};
pub use combidx_types::{
    BucketThresholds, Candidate, CandidateFeatures, CandidateId, CategoryKey, Cx, HitAnalysis,
    PairKey, PeriodInfo, PeriodPairRecord, PeriodSeq, RECORD_VERSION, UniverseShape, UnitState,
};

pub use combidx_bitmap as bitmap;
pub use combidx_classify as classify;
pub use combidx_period as period;
pub use combidx_store as store;
pub use combidx_types as types;
