//! Timed adversarial attempts for the Feud core.
//!
//! An attempt occupies an arena for a counter window. Defenders may block it
//! before the window closes; otherwise it resolves on its own and the
//! [`ResolutionHandler`] applies the success consequence. Each attempt
//! leaves the active state exactly once, whichever of the two paths wins.
//!
//! # Modules
//!
//! - [`error`] -- [`AttemptError`]
//! - [`handler`] -- The [`ResolutionHandler`] seam invoked on expiry
//! - [`registry`] -- [`AttemptRegistry`]: start, block, cancel, query

pub mod error;
pub mod handler;
pub mod registry;

pub use error::AttemptError;
pub use handler::{HandlerError, NoOpHandler, ResolutionHandler};
pub use registry::{AttemptRegistry, BlockOutcome, RegistryConfig, StartRequest};
