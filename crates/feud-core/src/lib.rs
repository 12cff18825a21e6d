//! Economy and conflict core for the Feud chat game.
//!
//! Ties the ledger, inventory store, attack memory, and attempt registry
//! together behind one [`Economy`] facade, configured from
//! `feud-config.yaml`.
//!
//! # Modules
//!
//! - [`config`] -- Typed YAML configuration ([`EconomyConfig`])
//! - [`economy`] -- The [`Economy`] facade and its cross-component operations
//! - [`error`] -- [`EconomyError`], the unified error taxonomy

pub mod config;
pub mod economy;
pub mod error;

pub use config::{ConfigError, EconomyConfig, LogFormat};
pub use economy::{BlockResolution, Cancellation, DefenderReward, Economy, Raid, Refund};
pub use error::EconomyError;
