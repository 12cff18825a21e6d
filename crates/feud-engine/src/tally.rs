//! Resolution handler that counts attempts which ran out their window.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use feud_arena::{HandlerError, ResolutionHandler};
use feud_types::Attempt;
use tracing::debug;

/// Counts successful attempts and the cost their initiators forfeited.
#[derive(Debug, Default)]
pub struct TallyHandler {
    resolved: AtomicU64,
    forfeited: AtomicI64,
}

impl TallyHandler {
    /// Create a handler with zeroed tallies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts resolved as successful so far.
    pub fn resolved(&self) -> u64 {
        self.resolved.load(Ordering::Acquire)
    }

    /// Total cost paid for the resolved attempts.
    pub fn forfeited(&self) -> i64 {
        self.forfeited.load(Ordering::Acquire)
    }
}

impl ResolutionHandler for TallyHandler {
    fn on_expired(&self, attempt: &Attempt) -> Result<(), HandlerError> {
        self.resolved.fetch_add(1, Ordering::AcqRel);
        self.forfeited.fetch_add(attempt.cost, Ordering::AcqRel);
        debug!(
            arena = %attempt.arena,
            initiator = %attempt.initiator,
            target_id = %attempt.target,
            "Attempt succeeded"
        );
        Ok(())
    }
}
