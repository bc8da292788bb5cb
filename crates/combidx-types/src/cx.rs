//! Cooperative cancellation for batch work.
//!
//! A batch polls [`Cx::checkpoint`] before each period pair. A stop request
//! is only observed there, so a pair that has started always commits.
//!
//! ```text
//! Idle ──start──► Running ──cancel──► StopRequested ──checkpoint──► Stopped
//!   └──────────────cancel──────────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use combidx_error::{CombidxError, Result};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelState {
    Idle,
    Running,
    StopRequested,
    /// A checkpoint has reported the stop to the batch.
    Stopped,
}

/// Why a stop was requested. A later request only replaces the recorded
/// reason if it is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CancelReason {
    Deadline,
    Operator,
    Shutdown,
}

#[derive(Debug)]
struct Shared {
    requested: AtomicBool,
    status: Mutex<(CancelState, Option<CancelReason>)>,
}

/// Cancellation token shared between an orchestrator and a batch.
///
/// Clones observe the same request.
#[derive(Debug, Clone)]
pub struct Cx {
    shared: Arc<Shared>,
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

impl Cx {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                requested: AtomicBool::new(false),
                status: Mutex::new((CancelState::Idle, None)),
            }),
        }
    }

    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.requested.load(Ordering::Acquire)
    }

    /// Request a stop on behalf of an operator.
    pub fn cancel(&self) {
        self.cancel_with_reason(CancelReason::Operator);
    }

    pub fn cancel_with_reason(&self, reason: CancelReason) {
        self.shared.requested.store(true, Ordering::Release);
        let mut status = self.shared.status.lock();
        if status.1.is_none_or(|r| reason > r) {
            status.1 = Some(reason);
        }
        if matches!(status.0, CancelState::Idle | CancelState::Running) {
            status.0 = CancelState::StopRequested;
        }
    }

    #[must_use]
    pub fn cancel_state(&self) -> CancelState {
        self.shared.status.lock().0
    }

    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.shared.status.lock().1
    }

    /// Mark a batch as started. Only moves out of `Idle`.
    pub fn transition_to_running(&self) {
        let mut status = self.shared.status.lock();
        if status.0 == CancelState::Idle {
            status.0 = CancelState::Running;
        }
    }

    /// `Err(Cancelled)` once a stop has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        if !self.is_cancel_requested() {
            return Ok(());
        }
        self.shared.status.lock().0 = CancelState::Stopped;
        Err(CombidxError::Cancelled)
    }
}
