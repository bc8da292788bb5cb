//! Period-pair index builder.
//!
//! For every consecutive pair of known periods `(base, target)` the builder
//! classifies the universe using the unit state anchored at `base` and
//! writes one record. One extra speculative record is kept for the period
//! after the last known one, with `target_id = last + 1`.
//!
//! ```text
//! not generated ──► generated(actual)       target outcome known
//!               └─► generated(speculative)  target not yet occurred
//! ```
//!
//! Batches are processed one pair at a time. Each record is committed on
//! its own, so a failed or cancelled batch never leaves a pair half written.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use combidx_classify::{classify, score_hits};
use combidx_error::{CombidxError, Result};
use combidx_store::CompactRecordStore;
use combidx_types::candidate::validate_units;
use combidx_types::{
    BucketThresholds, Cx, PairKey, PeriodInfo, PeriodPairRecord, PeriodSeq, RECORD_VERSION,
    now_unix_millis,
};
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, error, info, warn};

use crate::metrics::BuilderMetrics;
use crate::providers::{PeriodHistoryProvider, PeriodPairRecordStore, UnitStateProvider};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Builder tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    /// Window used when the caller does not pass one explicitly.
    ///
    /// Default: 5 periods.
    pub recent_window: usize,
    /// Per-pair errors kept verbatim in a [`BatchSummary`]; the rest are
    /// only counted.
    ///
    /// Default: 16.
    pub max_error_samples: usize,
    /// Whether actual pairs get a hit analysis side-table.
    ///
    /// Default: true.
    pub score_hits: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            recent_window: 5,
            max_error_samples: 16,
            score_hits: true,
        }
    }
}

impl BuilderConfig {
    /// Clamp configuration values into range.
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.recent_window == 0 {
            self.recent_window = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Batch summary
// ---------------------------------------------------------------------------

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Actual records written.
    pub generated: usize,
    /// Pairs abandoned on a per-pair error.
    pub skipped: usize,
    /// Records deleted before regeneration.
    pub purged: usize,
    /// Speculative records written (0 or 1).
    pub speculative: usize,
    /// Whether the batch stopped early on a cancel request.
    pub cancelled: bool,
    /// Every per-pair error, including those not sampled below.
    pub error_count: usize,
    /// The first `max_error_samples` per-pair errors, each a
    /// [`CombidxError::PartialBatchFailure`].
    pub errors: Vec<CombidxError>,
}

impl BatchSummary {
    /// No pair failed and the batch ran to the end.
    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && !self.cancelled
    }

    fn record_failure(&mut self, err: CombidxError, max_samples: usize) {
        self.skipped += 1;
        self.error_count += 1;
        if self.errors.len() < max_samples {
            self.errors.push(err);
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generated={} speculative={} skipped={} purged={} errors={}{}",
            self.generated,
            self.speculative,
            self.skipped,
            self.purged,
            self.error_count,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Target side of a pair.
#[derive(Debug, Clone)]
enum Target<'a> {
    Actual(&'a PeriodInfo),
    Speculative { id: PeriodSeq, label: String },
}

impl Target<'_> {
    fn id(&self) -> PeriodSeq {
        match self {
            Self::Actual(p) => p.seq,
            Self::Speculative { id, .. } => *id,
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Actual(p) => &p.label,
            Self::Speculative { label, .. } => label,
        }
    }

    fn is_speculative(&self) -> bool {
        matches!(self, Self::Speculative { .. })
    }
}

struct Job<'a> {
    base: &'a PeriodInfo,
    target: Target<'a>,
}

impl Job<'_> {
    fn key(&self) -> PairKey {
        PairKey::new(self.base.label.clone(), self.target.label())
    }
}

/// Maintains period-pair records in a [`PeriodPairRecordStore`].
///
/// Batch methods take `&mut self`: one batch at a time per builder.
pub struct PeriodPairIndexBuilder {
    store: Option<Arc<CompactRecordStore>>,
    thresholds: BucketThresholds,
    history: Arc<dyn PeriodHistoryProvider>,
    unit_states: Arc<dyn UnitStateProvider>,
    records: Arc<dyn PeriodPairRecordStore>,
    config: BuilderConfig,
    metrics: BuilderMetrics,
}

impl fmt::Debug for PeriodPairIndexBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodPairIndexBuilder")
            .field("store_loaded", &self.store.is_some())
            .field("thresholds", &self.thresholds)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PeriodPairIndexBuilder {
    /// Create a builder with no candidate store attached.
    pub fn new(
        thresholds: BucketThresholds,
        history: Arc<dyn PeriodHistoryProvider>,
        unit_states: Arc<dyn UnitStateProvider>,
        records: Arc<dyn PeriodPairRecordStore>,
    ) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            store: None,
            thresholds,
            history,
            unit_states,
            records,
            config: BuilderConfig::default(),
            metrics: BuilderMetrics::new(),
        })
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<CompactRecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config.validated();
        self
    }

    /// Attach or detach the candidate store between batches.
    pub fn set_store(&mut self, store: Option<Arc<CompactRecordStore>>) {
        self.store = store;
    }

    pub fn store(&self) -> Option<&Arc<CompactRecordStore>> {
        self.store.as_ref()
    }

    pub fn thresholds(&self) -> &BucketThresholds {
        &self.thresholds
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn metrics(&self) -> &BuilderMetrics {
        &self.metrics
    }

    /// Delete every record and rebuild all consecutive pairs of `periods`
    /// plus one speculative pair after the last.
    ///
    /// `periods` must be in strictly ascending id order with distinct
    /// labels; otherwise nothing is deleted.
    pub fn full_regenerate(&mut self, cx: &Cx, periods: &[PeriodInfo]) -> Result<BatchSummary> {
        let span = tracing::span!(
            target: "combidx.period",
            Level::INFO,
            "full_regenerate",
            periods = periods.len()
        );
        let _guard = span.enter();
        cx.transition_to_running();
        let mut summary = BatchSummary::default();
        if self.stop_requested(cx, &mut summary) {
            return Ok(summary);
        }

        validate_ascending(periods)?;
        let mut jobs: Vec<Job<'_>> = periods
            .windows(2)
            .map(|w| Job {
                base: &w[0],
                target: Target::Actual(&w[1]),
            })
            .collect();
        if let Some(spec) = self.speculative_job(periods)? {
            jobs.push(spec);
        }

        let created = self.created_at_of(&jobs)?;
        summary.purged = self.records.delete_where(&|_| true)?;
        self.metrics.record_purged(summary.purged as u64);
        if periods.is_empty() {
            warn!(
                target: "combidx.period",
                "no known periods; no speculative record can be placed"
            );
        }

        self.run_jobs(cx, jobs, &created, &mut summary)?;
        info!(target: "combidx.period", %summary, "full regenerate finished");
        Ok(summary)
    }

    /// [`Self::full_regenerate`] over every period the history provider
    /// knows.
    pub fn full_regenerate_from_history(&mut self, cx: &Cx) -> Result<BatchSummary> {
        let periods = self.history.periods()?;
        self.full_regenerate(cx, &periods)
    }

    /// Refresh the most recent `recent_window` target periods.
    ///
    /// Deletes every speculative record and every record whose target lies
    /// in the window, then rebuilds those pairs plus one new speculative
    /// pair. The window is clamped to `[1, known periods]`.
    pub fn incremental_update(&mut self, cx: &Cx, recent_window: usize) -> Result<BatchSummary> {
        let periods = self.history.periods()?;
        let window = recent_window.clamp(1, periods.len().max(1)).min(periods.len());
        let span = tracing::span!(
            target: "combidx.period",
            Level::INFO,
            "incremental_update",
            periods = periods.len(),
            window
        );
        let _guard = span.enter();
        cx.transition_to_running();
        let mut summary = BatchSummary::default();
        if self.stop_requested(cx, &mut summary) {
            return Ok(summary);
        }

        validate_ascending(&periods)?;
        let first_target = periods.len() - window;
        let mut jobs: Vec<Job<'_>> = (first_target.max(1)..periods.len())
            .map(|i| Job {
                base: &periods[i - 1],
                target: Target::Actual(&periods[i]),
            })
            .collect();
        if let Some(spec) = self.speculative_job(&periods)? {
            jobs.push(spec);
        }

        let created = self.created_at_of(&jobs)?;
        let window_ids: BTreeSet<PeriodSeq> = periods[first_target..].iter().map(|p| p.seq).collect();
        let speculative = self.records.delete_where(&|r| r.is_speculative)?;
        let stale = self
            .records
            .delete_where(&|r| window_ids.contains(&r.target_id))?;
        summary.purged = speculative + stale;
        self.metrics.record_purged(summary.purged as u64);
        debug!(
            target: "combidx.period",
            speculative,
            stale,
            "purged records before incremental rebuild"
        );
        if periods.is_empty() {
            warn!(
                target: "combidx.period",
                "no known periods; no speculative record can be placed"
            );
        }

        self.run_jobs(cx, jobs, &created, &mut summary)?;
        info!(target: "combidx.period", %summary, "incremental update finished");
        Ok(summary)
    }

    /// [`Self::incremental_update`] with the configured window.
    pub fn incremental_update_default(&mut self, cx: &Cx) -> Result<BatchSummary> {
        self.incremental_update(cx, self.config.recent_window)
    }

    fn stop_requested(&self, cx: &Cx, summary: &mut BatchSummary) -> bool {
        if cx.checkpoint().is_ok() {
            return false;
        }
        summary.cancelled = true;
        self.metrics.record_cancelled();
        info!(
            target: "combidx.period",
            reason = ?cx.cancel_reason(),
            generated = summary.generated,
            "batch cancelled"
        );
        true
    }

    fn speculative_job<'a>(&self, periods: &'a [PeriodInfo]) -> Result<Option<Job<'a>>> {
        let Some(last) = periods.last() else {
            return Ok(None);
        };
        let id = last.seq.next().ok_or_else(|| {
            CombidxError::validation(format!("period id {} has no successor", last.seq))
        })?;
        let label = self
            .history
            .next_label(last)
            .unwrap_or_else(|| id.to_string());
        Ok(Some(Job {
            base: last,
            target: Target::Speculative { id, label },
        }))
    }

    /// `created_at` of records about to be replaced, read before purging.
    fn created_at_of(&self, jobs: &[Job<'_>]) -> Result<BTreeMap<PairKey, u64>> {
        let mut out = BTreeMap::new();
        for job in jobs {
            let key = job.key();
            if let Some(existing) = self.records.find(&key)? {
                out.insert(key, existing.created_at);
            }
        }
        Ok(out)
    }

    fn run_jobs(
        &self,
        cx: &Cx,
        jobs: Vec<Job<'_>>,
        created: &BTreeMap<PairKey, u64>,
        summary: &mut BatchSummary,
    ) -> Result<()> {
        for job in jobs {
            if self.stop_requested(cx, summary) {
                return Ok(());
            }
            let key = job.key();
            let span = tracing::span!(
                target: "combidx.period",
                Level::DEBUG,
                "pair",
                pair = %key,
                speculative = job.target.is_speculative()
            );
            let _guard = span.enter();

            let outcome = self
                .build_record(&job, created.get(&key).copied())
                .and_then(|record| self.records.upsert(record));
            match outcome {
                Ok(()) => {
                    let speculative = job.target.is_speculative();
                    self.metrics.record_generated(speculative);
                    if speculative {
                        summary.speculative += 1;
                    } else {
                        summary.generated += 1;
                    }
                    debug!(target: "combidx.period", "pair committed");
                }
                Err(err) if err.is_fatal() => {
                    if matches!(err, CombidxError::InvariantViolation { .. }) {
                        self.metrics.record_invariant_violation();
                    }
                    error!(target: "combidx.period", %err, "fatal error; aborting batch");
                    return Err(err);
                }
                Err(err) => {
                    warn!(target: "combidx.period", %err, "pair skipped");
                    self.metrics.record_skipped();
                    summary.record_failure(
                        CombidxError::partial(key.to_string(), err),
                        self.config.max_error_samples,
                    );
                }
            }
        }
        Ok(())
    }

    fn build_record(&self, job: &Job<'_>, created_at: Option<u64>) -> Result<PeriodPairRecord> {
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| CombidxError::not_found("candidate store is not loaded"))?;
        let state = self.unit_states.unit_state(job.base)?.ok_or_else(|| {
            CombidxError::not_found(format!("unit state for base period {}", job.base.label))
        })?;
        if let Target::Actual(target) = job.target {
            validate_units(store.shape(), &target.outcome).map_err(|e| {
                CombidxError::validation(format!("outcome of period {}: {e}", target.label))
            })?;
        }

        let started = Instant::now();
        let classification = classify(store, &state, &self.thresholds)?;
        self.metrics
            .record_classify(u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX));

        let hit_analysis = match job.target {
            Target::Actual(target) if self.config.score_hits => {
                Some(score_hits(store, &classification, &target.outcome)?)
            }
            _ => None,
        };

        let now = now_unix_millis();
        Ok(PeriodPairRecord {
            version: RECORD_VERSION,
            base_period: job.base.label.clone(),
            target_period: job.target.label().to_owned(),
            base_id: job.base.seq,
            target_id: job.target.id(),
            is_speculative: job.target.is_speculative(),
            categories: classification.into_id_lists(),
            total_candidates: store.len(),
            hit_analysis,
            created_at: created_at.unwrap_or(now),
            updated_at: now,
        })
    }
}

/// Periods must have strictly ascending ids and distinct labels.
fn validate_ascending(periods: &[PeriodInfo]) -> Result<()> {
    if let Some(w) = periods.windows(2).find(|w| w[0].seq >= w[1].seq) {
        return Err(CombidxError::validation(format!(
            "period ids are not strictly ascending: {} ({}) then {} ({})",
            w[0].seq, w[0].label, w[1].seq, w[1].label
        )));
    }
    let mut labels = BTreeSet::new();
    for p in periods {
        if !labels.insert(p.label.as_str()) {
            return Err(CombidxError::validation(format!(
                "period label {} appears twice",
                p.label
            )));
        }
    }
    Ok(())
}
