//! Error types for the soak harness binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup, the soak run, and the closing audit.

/// Top-level error for the soak harness.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: feud_core::ConfigError,
    },

    /// Building or seeding the economy failed.
    #[error("economy error: {source}")]
    Economy {
        /// The underlying economy error.
        #[from]
        source: feud_core::EconomyError,
    },

    /// The soak run could not be carried out.
    #[error("soak error: {message}")]
    Soak {
        /// Description of the failure.
        message: String,
    },

    /// The closing audit found violations.
    #[error("audit failed with {count} violation(s), first: {first}")]
    Audit {
        /// Number of violations found.
        count: usize,
        /// The first violation, for the exit message.
        first: String,
    },
}
