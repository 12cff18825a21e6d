//! The seam through which the registry applies the success consequence.

use feud_types::Attempt;

/// Error type a [`ResolutionHandler`] may return. It is logged, never surfaced.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Applies the consequence of an attempt that ran out its window unblocked.
///
/// Called at most once per attempt, after the arena slot has been cleared.
/// An error or a panic is logged and swallowed; the arena is free either
/// way.
pub trait ResolutionHandler: Send + Sync {
    /// Called with the attempt in its `Resolved` state.
    fn on_expired(&self, attempt: &Attempt) -> Result<(), HandlerError>;
}

/// A handler that does nothing. Useful in tests and for callers that only
/// care about blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ResolutionHandler for NoOpHandler {
    fn on_expired(&self, _attempt: &Attempt) -> Result<(), HandlerError> {
        Ok(())
    }
}
