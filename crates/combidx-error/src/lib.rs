use thiserror::Error;

/// Primary error type for combidx operations.
///
/// The four core kinds map onto how a batch reacts to them: validation and
/// not-found errors abort a single unit of work, per-pair failures are
/// counted and skipped, invariant violations are always fatal.
#[derive(Error, Debug)]
pub enum CombidxError {
    // === Input Errors ===
    /// Malformed universe, duplicate ids, out-of-domain values, bad config.
    #[error("validation failed: {detail}")]
    Validation { detail: String },

    /// A required input (unit state, period, loaded store) is absent.
    #[error("not found: {what}")]
    NotFound { what: String },

    // === Batch Errors ===
    /// One period pair failed; the surrounding batch keeps going.
    #[error("period pair {pair} failed: {source}")]
    PartialBatchFailure {
        pair: String,
        #[source]
        source: Box<CombidxError>,
    },

    /// A partition or coverage check failed. The index is unsafe to serve.
    #[error("invariant violated: {detail}")]
    InvariantViolation { detail: String },

    // === Storage Errors ===
    /// A compact slot decoded to something other than what was stored.
    #[error("corrupt slot: {detail}")]
    Corrupt { detail: String },

    /// Record (de)serialization failed at the persistence boundary.
    #[error("serialization error: {0}")]
    Serialization(String),

    // === Control ===
    /// The caller requested a stop between units of work.
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification of a [`CombidxError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    PartialBatchFailure,
    InvariantViolation,
    Corrupt,
    Serialization,
    Cancelled,
}

impl CombidxError {
    /// Map this error to its coarse kind.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this error must stop the caller immediately.
    ///
    /// Invariant violations and corruption mean derived state can no longer
    /// be trusted; nothing downstream may continue on top of it.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::Corrupt { .. }
        )
    }

    /// Whether a batch may absorb this error by skipping one pair.
    pub const fn is_per_pair(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::NotFound { .. } | Self::PartialBatchFailure { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => {
                Some("Make sure unit state and period history cover the requested range")
            }
            Self::InvariantViolation { .. } => {
                Some("Rebuild the index from the candidate universe; do not serve queries")
            }
            Self::Corrupt { .. } => Some("Reload the candidate store from its provider"),
            Self::Cancelled => Some("Re-run the batch; committed pairs are kept"),
            _ => None,
        }
    }

    /// Create a validation error.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an invariant violation.
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            detail: detail.into(),
        }
    }

    /// Create a corruption error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// Wrap an error that aborted a single period pair.
    pub fn partial(pair: impl Into<String>, source: Self) -> Self {
        Self::PartialBatchFailure {
            pair: pair.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias using `CombidxError`.
pub type Result<T> = std::result::Result<T, CombidxError>;
