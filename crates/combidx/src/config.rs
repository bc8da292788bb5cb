//! Engine configuration, loadable from JSON.

use combidx_bitmap::IndexConfig;
use combidx_error::{CombidxError, Result};
use combidx_period::BuilderConfig;
use combidx_types::{BucketThresholds, UniverseShape};
use serde::{Deserialize, Serialize};

/// Everything an [`Engine`](crate::Engine) needs besides its providers.
///
/// `shape` and `thresholds` are required; the rest fall back to defaults.
///
/// ```json
/// {
///   "shape": { "alphabet": 35, "tuple_len": 5 },
///   "thresholds": { "upper_bounds": [4, 9], "labels": ["low", "mid", "high"] },
///   "index": { "sum_band_width": 10 },
///   "builder": { "recent_window": 3 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub shape: UniverseShape,
    pub thresholds: BucketThresholds,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub builder: BuilderConfig,
}

impl EngineConfig {
    pub fn new(shape: UniverseShape, thresholds: BucketThresholds) -> Self {
        Self {
            shape,
            thresholds,
            index: IndexConfig::default(),
            builder: BuilderConfig::default(),
        }
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    #[must_use]
    pub fn with_builder(mut self, builder: BuilderConfig) -> Self {
        self.builder = builder;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.shape.validate()?;
        self.thresholds.validate()?;
        self.index.validate()
    }

    /// Validate, clamping builder tunables into range.
    pub fn validated(mut self) -> Result<Self> {
        self.validate()?;
        self.builder = self.builder.validated();
        Ok(self)
    }

    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CombidxError::Serialization(e.to_string()))?;
        config.validated()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CombidxError::Serialization(e.to_string()))
    }
}
