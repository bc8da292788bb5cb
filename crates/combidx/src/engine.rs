//! The engine instance: one candidate universe, its published bitmap index,
//! and the entry points that run against them.

use std::sync::Arc;

use combidx_bitmap::{BitSet, BitmapIndex, FeatureDimension, FeatureKey, IndexConfig, IndexHandle};
use combidx_classify::{Classification, classify, score_hits};
use combidx_error::{CombidxError, Result};
use combidx_period::{
    PeriodHistoryProvider, PeriodPairIndexBuilder, PeriodPairRecordStore, UnitStateProvider,
};
use combidx_store::{CandidateUniverseProvider, CompactRecordStore, EnumeratedUniverse};
use combidx_types::{Candidate, CandidateId, HitAnalysis, UnitState};
use tracing::{info, warn};

use crate::config::EngineConfig;

/// An explicit engine instance; callers pass it by reference.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: Arc<CompactRecordStore>,
    index: IndexHandle,
}

impl Engine {
    /// Load the universe from `provider` and build the configured index.
    ///
    /// The provider's shape must equal `config.shape`.
    pub fn load(config: EngineConfig, provider: &dyn CandidateUniverseProvider) -> Result<Self> {
        let config = config.validated()?;
        if provider.shape() != config.shape {
            return Err(CombidxError::validation(format!(
                "provider shape {:?} differs from configured shape {:?}",
                provider.shape(),
                config.shape
            )));
        }
        let store = Arc::new(CompactRecordStore::from_provider(provider)?);
        let index = BitmapIndex::build_static_indexes(&store, config.index.clone())?;
        info!(
            target: "combidx",
            candidates = store.len(),
            buckets = config.thresholds.bucket_count(),
            "engine ready"
        );
        Ok(Self {
            config,
            store,
            index: IndexHandle::new(index),
        })
    }

    /// Load by enumerating the configured shape.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let provider = EnumeratedUniverse::new(config.shape);
        Self::load(config, &provider)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CompactRecordStore> {
        &self.store
    }

    /// The currently published index.
    pub fn index(&self) -> Arc<BitmapIndex> {
        self.index.snapshot()
    }

    pub fn index_handle(&self) -> &IndexHandle {
        &self.index
    }

    pub fn candidate(&self, id: CandidateId) -> Option<Candidate> {
        self.store.get(id)
    }

    /// Build a fresh index with `config` and publish it.
    ///
    /// On error the previously published index stays in place.
    pub fn rebuild_index(&self, config: IndexConfig) -> Result<Arc<BitmapIndex>> {
        match BitmapIndex::build_static_indexes(&self.store, config) {
            Ok(next) => {
                self.index.publish(next);
                Ok(self.index.snapshot())
            }
            Err(err) => {
                warn!(target: "combidx", %err, "index rebuild failed; keeping published index");
                Err(err)
            }
        }
    }

    /// Publish an index extended with `dim`, sharing every existing map.
    pub fn add_dimension(&self, dim: FeatureDimension) -> Result<Arc<BitmapIndex>> {
        let next = self.index.snapshot().with_dimension(&self.store, dim)?;
        self.index.publish(next);
        Ok(self.index.snapshot())
    }

    /// Intersection of the bitsets named by `predicates`.
    ///
    /// A key with no bitset matches nothing; an unindexed dimension is an
    /// error. No predicates selects the whole universe.
    pub fn select(&self, predicates: &[(FeatureDimension, FeatureKey)]) -> Result<BitSet> {
        let index = self.index.snapshot();
        let mut acc = index.create_full_set();
        for (dim, key) in predicates {
            let fi = index
                .dimension(*dim)
                .ok_or_else(|| CombidxError::not_found(format!("dimension {dim}")))?;
            match fi.get(key) {
                Some(bits) => acc = acc.and(bits),
                None => return Ok(index.create_empty_set()),
            }
        }
        Ok(acc)
    }

    /// Classify with the configured thresholds.
    pub fn classify(&self, state: &UnitState) -> Result<Classification> {
        classify(&self.store, state, &self.config.thresholds)
    }

    pub fn score_hits(&self, classification: &Classification, outcome: &[u8]) -> Result<HitAnalysis> {
        score_hits(&self.store, classification, outcome)
    }

    /// A period-pair builder wired to this engine's store and thresholds.
    pub fn builder(
        &self,
        history: Arc<dyn PeriodHistoryProvider>,
        unit_states: Arc<dyn UnitStateProvider>,
        records: Arc<dyn PeriodPairRecordStore>,
    ) -> Result<PeriodPairIndexBuilder> {
        Ok(PeriodPairIndexBuilder::new(
            self.config.thresholds.clone(),
            history,
            unit_states,
            records,
        )?
        .with_store(Arc::clone(&self.store))
        .with_config(self.config.builder.clone()))
    }
}
