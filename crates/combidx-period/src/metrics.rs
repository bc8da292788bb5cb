//! Builder observability counters.
//!
//! Each [`PeriodPairIndexBuilder`](crate::PeriodPairIndexBuilder) owns one
//! [`BuilderMetrics`]; there is no process-wide instance.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ---------------------------------------------------------------------------
// Metric counters
// ---------------------------------------------------------------------------

/// Atomic counters tracking batch activity.
#[derive(Debug)]
pub struct BuilderMetrics {
    /// Records written for actual (already occurred) target periods.
    pub pairs_generated_total: AtomicU64,
    /// Pairs skipped because a prerequisite was missing or invalid.
    pub pairs_skipped_total: AtomicU64,
    /// Speculative records written.
    pub speculative_written_total: AtomicU64,
    /// Records deleted before regeneration.
    pub records_purged_total: AtomicU64,
    /// Partition checks that failed.
    pub invariant_violations_total: AtomicU64,
    /// Cumulative wall-clock time spent in `classify`, in microseconds.
    pub classify_duration_us_total: AtomicU64,
    /// Batches that stopped early on cancellation.
    pub batches_cancelled_total: AtomicU64,
}

impl BuilderMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pairs_generated_total: AtomicU64::new(0),
            pairs_skipped_total: AtomicU64::new(0),
            speculative_written_total: AtomicU64::new(0),
            records_purged_total: AtomicU64::new(0),
            invariant_violations_total: AtomicU64::new(0),
            classify_duration_us_total: AtomicU64::new(0),
            batches_cancelled_total: AtomicU64::new(0),
        }
    }

    pub fn record_generated(&self, speculative: bool) {
        if speculative {
            self.speculative_written_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pairs_generated_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_skipped(&self) {
        self.pairs_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purged(&self, count: u64) {
        self.records_purged_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invariant_violation(&self) {
        self.invariant_violations_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classify(&self, duration_us: u64) {
        self.classify_duration_us_total
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.batches_cancelled_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> BuilderMetricsSnapshot {
        BuilderMetricsSnapshot {
            pairs_generated_total: self.pairs_generated_total.load(Ordering::Relaxed),
            pairs_skipped_total: self.pairs_skipped_total.load(Ordering::Relaxed),
            speculative_written_total: self.speculative_written_total.load(Ordering::Relaxed),
            records_purged_total: self.records_purged_total.load(Ordering::Relaxed),
            invariant_violations_total: self.invariant_violations_total.load(Ordering::Relaxed),
            classify_duration_us_total: self.classify_duration_us_total.load(Ordering::Relaxed),
            batches_cancelled_total: self.batches_cancelled_total.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.pairs_generated_total.store(0, Ordering::Relaxed);
        self.pairs_skipped_total.store(0, Ordering::Relaxed);
        self.speculative_written_total.store(0, Ordering::Relaxed);
        self.records_purged_total.store(0, Ordering::Relaxed);
        self.invariant_violations_total.store(0, Ordering::Relaxed);
        self.classify_duration_us_total.store(0, Ordering::Relaxed);
        self.batches_cancelled_total.store(0, Ordering::Relaxed);
    }
}

impl Default for BuilderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of [`BuilderMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuilderMetricsSnapshot {
    pub pairs_generated_total: u64,
    pub pairs_skipped_total: u64,
    pub speculative_written_total: u64,
    pub records_purged_total: u64,
    pub invariant_violations_total: u64,
    pub classify_duration_us_total: u64,
    pub batches_cancelled_total: u64,
}

impl BuilderMetricsSnapshot {
    /// Mean classification time per written record, in microseconds.
    #[must_use]
    pub fn avg_classify_us(&self) -> u64 {
        let written = self.pairs_generated_total + self.speculative_written_total;
        if written == 0 {
            0
        } else {
            self.classify_duration_us_total / written
        }
    }
}

impl fmt::Display for BuilderMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pairs_generated={} skipped={} speculative={} purged={} invariant_violations={} avg_classify_us={} cancelled={}",
            self.pairs_generated_total,
            self.pairs_skipped_total,
            self.speculative_written_total,
            self.records_purged_total,
            self.invariant_violations_total,
            self.avg_classify_us(),
            self.batches_cancelled_total,
        )
    }
}
