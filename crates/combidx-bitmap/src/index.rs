//! Static feature indexes: one [`BitSet`] per distinct feature value.
//!
//! Each [`FeatureDimension`] is built into its own isolated
//! [`FeatureIndex`] and held behind an `Arc`, so [`BitmapIndex::with_dimension`]
//! can add a dimension without touching (or copying) the existing ones. An
//! index is immutable once built; a rebuild always produces a new value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use combidx_error::{CombidxError, Result};
use combidx_store::CompactRecordStore;
use combidx_types::{CandidateFeatures, CandidateId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bitset::{BitSet, BitSetBuilder};

// ---------------------------------------------------------------------------
// Dimensions and keys
// ---------------------------------------------------------------------------

/// A derived feature the index can be built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureDimension {
    /// Unit sum, banded by [`IndexConfig::sum_band_width`].
    Sum,
    /// `max - min`, banded by [`IndexConfig::span_band_width`].
    Span,
    OddCount,
    /// AC value.
    Dispersion,
    /// Zone composition label such as `2:1:2`.
    ZoneComposition,
    /// One bitset per unit value: the candidates containing it.
    Unit,
}

impl FeatureDimension {
    pub const ALL: [Self; 6] = [
        Self::Sum,
        Self::Span,
        Self::OddCount,
        Self::Dispersion,
        Self::ZoneComposition,
        Self::Unit,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Span => "span",
            Self::OddCount => "odd_count",
            Self::Dispersion => "dispersion",
            Self::ZoneComposition => "zone_composition",
            Self::Unit => "unit",
        }
    }

    /// Whether keys of this dimension are ordered numbers.
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::ZoneComposition)
    }
}

impl fmt::Display for FeatureDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key of one bitset inside a dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    Value(u16),
    /// Inclusive band `[start, end]`.
    Band { start: u16, end: u16 },
    Label(String),
}

impl FeatureKey {
    /// Inclusive numeric range covered by this key; `None` for labels.
    pub fn numeric_range(&self) -> Option<(u16, u16)> {
        match *self {
            Self::Value(v) => Some((v, v)),
            Self::Band { start, end } => Some((start, end)),
            Self::Label(_) => None,
        }
    }

    fn banded(value: u16, width: u16) -> Self {
        if width <= 1 {
            return Self::Value(value);
        }
        let start = value / width * width;
        Self::Band {
            start,
            end: start.saturating_add(width - 1),
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Band { start, end } => write!(f, "{start}-{end}"),
            Self::Label(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which dimensions to build and how numeric ones are banded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    pub dimensions: Vec<FeatureDimension>,
    /// Width of a sum band; 1 indexes every exact sum.
    pub sum_band_width: u16,
    /// Width of a span band; 1 indexes every exact span.
    pub span_band_width: u16,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: FeatureDimension::ALL.to_vec(),
            sum_band_width: 10,
            span_band_width: 5,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sum_band_width == 0 || self.span_band_width == 0 {
            return Err(CombidxError::validation("band widths must be at least 1"));
        }
        for (i, dim) in self.dimensions.iter().enumerate() {
            if self.dimensions[..i].contains(dim) {
                return Err(CombidxError::validation(format!(
                    "dimension {dim} listed twice"
                )));
            }
        }
        Ok(())
    }

    /// Validate and return `self`.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Keys candidate `units`/`features` contributes to in `dim`.
    fn push_keys(
        &self,
        dim: FeatureDimension,
        units: &[u8],
        features: &CandidateFeatures,
        out: &mut Vec<FeatureKey>,
    ) {
        match dim {
            FeatureDimension::Sum => out.push(FeatureKey::banded(features.sum, self.sum_band_width)),
            FeatureDimension::Span => out.push(FeatureKey::banded(
                u16::from(features.span),
                self.span_band_width,
            )),
            FeatureDimension::OddCount => out.push(FeatureKey::Value(u16::from(features.odd_count))),
            FeatureDimension::Dispersion => {
                out.push(FeatureKey::Value(u16::from(features.dispersion)));
            }
            FeatureDimension::ZoneComposition => out.push(FeatureKey::Label(features.zone_label())),
            FeatureDimension::Unit => {
                out.extend(units.iter().map(|&u| FeatureKey::Value(u16::from(u))));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-dimension index
// ---------------------------------------------------------------------------

/// Every bitset of one dimension, ordered by key.
#[derive(Debug, Clone)]
pub struct FeatureIndex {
    dimension: FeatureDimension,
    entries: BTreeMap<FeatureKey, BitSet>,
}

impl FeatureIndex {
    pub fn dimension(&self) -> FeatureDimension {
        self.dimension
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &FeatureKey) -> Option<&BitSet> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FeatureKey, &BitSet)> {
        self.entries.iter()
    }

    fn footprint_bytes(&self) -> usize {
        self.entries
            .values()
            .map(|b| std::mem::size_of_val(b.words()))
            .sum()
    }
}

/// One pass over the store, accumulating every requested dimension.
fn build_dimensions(
    store: &CompactRecordStore,
    dims: &[FeatureDimension],
    config: &IndexConfig,
) -> Result<Vec<FeatureIndex>> {
    let n = store.len();
    let mut builders: Vec<BTreeMap<FeatureKey, BitSetBuilder>> = vec![BTreeMap::new(); dims.len()];
    let mut keys = Vec::new();

    for raw in 0..n {
        let id = CandidateId::new(raw);
        let candidate = store
            .try_get(id)?
            .ok_or_else(|| CombidxError::corrupt(format!("store has no slot for id {id}")))?;
        for (dim, acc) in dims.iter().zip(builders.iter_mut()) {
            keys.clear();
            config.push_keys(*dim, &candidate.units, &candidate.features, &mut keys);
            for key in keys.drain(..) {
                acc.entry(key)
                    .or_insert_with(|| BitSetBuilder::new(n))
                    .insert(raw)?;
            }
        }
    }

    Ok(dims
        .iter()
        .zip(builders)
        .map(|(&dimension, acc)| FeatureIndex {
            dimension,
            entries: acc.into_iter().map(|(k, b)| (k, b.freeze())).collect(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// BitmapIndex
// ---------------------------------------------------------------------------

/// Immutable set of feature indexes over one candidate universe.
#[derive(Debug, Clone)]
pub struct BitmapIndex {
    universe_len: u32,
    fingerprint: u64,
    config: IndexConfig,
    dimensions: BTreeMap<FeatureDimension, Arc<FeatureIndex>>,
}

impl BitmapIndex {
    /// Build every configured dimension in one `O(N * F)` pass.
    pub fn build_static_indexes(store: &CompactRecordStore, config: IndexConfig) -> Result<Self> {
        let config = config.validated()?;
        let started = Instant::now();
        let built = build_dimensions(store, &config.dimensions, &config)?;
        let dimensions: BTreeMap<_, _> = built
            .into_iter()
            .map(|fi| (fi.dimension, Arc::new(fi)))
            .collect();
        let index = Self {
            universe_len: store.len(),
            fingerprint: store.fingerprint(),
            config,
            dimensions,
        };
        info!(
            target: "combidx.bitmap",
            candidates = index.universe_len,
            dimensions = index.dimensions.len(),
            bitsets = index.bitset_count(),
            bytes = index.footprint_bytes(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "bitmap index built"
        );
        Ok(index)
    }

    /// A new index with `dim` added; existing dimensions are shared, not
    /// rebuilt. Adding a dimension that is already present returns a clone.
    pub fn with_dimension(&self, store: &CompactRecordStore, dim: FeatureDimension) -> Result<Self> {
        if store.fingerprint() != self.fingerprint || store.len() != self.universe_len {
            return Err(CombidxError::validation(format!(
                "store fingerprint {:016x} does not match index fingerprint {:016x}",
                store.fingerprint(),
                self.fingerprint
            )));
        }
        let mut next = self.clone();
        if next.dimensions.contains_key(&dim) {
            debug!(target: "combidx.bitmap", %dim, "dimension already indexed");
            return Ok(next);
        }
        let built = build_dimensions(store, &[dim], &self.config)?;
        for fi in built {
            debug!(target: "combidx.bitmap", %dim, keys = fi.len(), "dimension added");
            next.dimensions.insert(fi.dimension, Arc::new(fi));
        }
        next.config.dimensions.push(dim);
        Ok(next)
    }

    #[inline]
    pub fn universe_len(&self) -> u32 {
        self.universe_len
    }

    /// Fingerprint of the store this index was built from.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn dimensions(&self) -> impl Iterator<Item = FeatureDimension> + '_ {
        self.dimensions.keys().copied()
    }

    pub fn dimension(&self, dim: FeatureDimension) -> Option<&FeatureIndex> {
        self.dimensions.get(&dim).map(AsRef::as_ref)
    }

    /// Whether both indexes hold the very same built map for `dim`.
    pub fn shares_dimension(&self, other: &Self, dim: FeatureDimension) -> bool {
        match (self.dimensions.get(&dim), other.dimensions.get(&dim)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn lookup(&self, dim: FeatureDimension, key: &FeatureKey) -> Option<&BitSet> {
        self.dimension(dim)?.get(key)
    }

    /// Keys of `dim`, ascending; empty when the dimension is not indexed.
    pub fn keys(&self, dim: FeatureDimension) -> Vec<&FeatureKey> {
        self.dimension(dim)
            .map(|fi| fi.entries.keys().collect())
            .unwrap_or_default()
    }

    /// Union of every bitset in `dim` whose key intersects `[lo, hi]`.
    pub fn range(&self, dim: FeatureDimension, lo: u16, hi: u16) -> Result<BitSet> {
        if !dim.is_numeric() {
            return Err(CombidxError::validation(format!(
                "dimension {dim} has no numeric order"
            )));
        }
        if lo > hi {
            return Err(CombidxError::validation(format!("empty range {lo}..={hi}")));
        }
        let fi = self
            .dimension(dim)
            .ok_or_else(|| CombidxError::not_found(format!("dimension {dim}")))?;
        let mut acc = self.create_empty_set();
        for (key, bits) in fi.iter() {
            if let Some((start, end)) = key.numeric_range() {
                if start <= hi && end >= lo {
                    acc = acc.or(bits);
                }
            }
        }
        Ok(acc)
    }

    pub fn create_full_set(&self) -> BitSet {
        BitSet::full(self.universe_len)
    }

    pub fn create_empty_set(&self) -> BitSet {
        BitSet::empty(self.universe_len)
    }

    /// Ad hoc set; ids `>= N` are a validation error.
    pub fn create_from_ids(&self, ids: &[CandidateId]) -> Result<BitSet> {
        BitSet::from_candidates(self.universe_len, ids)
    }

    /// Total bitsets across all dimensions.
    pub fn bitset_count(&self) -> usize {
        self.dimensions.values().map(|fi| fi.len()).sum()
    }

    /// Bytes held by bitset words.
    pub fn footprint_bytes(&self) -> usize {
        self.dimensions.values().map(|fi| fi.footprint_bytes()).sum()
    }
}
