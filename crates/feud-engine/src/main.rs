//! Soak harness binary for the Feud economy core.
//!
//! Drives a live [`Economy`] with many concurrent simulated participants
//! and audits it afterwards. A clean run exits zero; any audit violation
//! makes the process exit non-zero.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `feud-config.yaml` (or the path given as the
//!    first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Open the economy, replaying the ledger journal when one is configured
//! 4. Seed participants and run the soak
//! 5. Audit and log the result

mod error;
mod soak;
mod tally;

use std::path::PathBuf;
use std::sync::Arc;

use feud_core::config::LoggingConfig;
use feud_core::{Economy, EconomyConfig, LogFormat};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::tally::TallyHandler;

/// Config file looked up in the working directory when no path is given.
const DEFAULT_CONFIG_PATH: &str = "feud-config.yaml";

/// Application entry point for the soak harness.
///
/// # Errors
///
/// Returns an error if configuration, economy setup, or the soak fails,
/// or if the closing audit finds a violation.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging depends on it, so it comes first.
    let (config, loaded_from) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("feud-engine starting");
    match &loaded_from {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        participants = config.soak.participants,
        arenas = config.soak.arenas,
        duration_ms = config.soak.duration_ms,
        window_ms = config.soak.window_ms,
        seed = config.soak.seed,
        journal = config.journal.path.is_some(),
        "Soak configuration"
    );

    // 3. Open the economy.
    let soak_config = config.soak.clone();
    let tally = Arc::new(TallyHandler::new());
    let economy = Arc::new(Economy::open(config, tally.clone())?);
    info!(
        replayed_entries = economy.ledger().len(),
        "Economy opened"
    );

    // 4. Run the soak.
    let report = soak::run(economy, tally, &soak_config).await?;

    // 5. Log the result.
    info!(
        operations = report.operations,
        rejected = report.rejected,
        internal_errors = report.internal_errors,
        started = report.started,
        blocked = report.blocked,
        resolved = report.resolved,
        forfeited = report.forfeited,
        entries = report.entries,
        "Soak finished"
    );

    if !report.is_clean() {
        for violation in &report.violations {
            error!(violation = %violation, "Audit violation");
        }
        let first = report.violations.first().cloned().unwrap_or_default();
        return Err(EngineError::Audit {
            count: report.violations.len(),
            first,
        }
        .into());
    }

    info!("feud-engine audit clean, shutdown complete");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match logging.format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Load the configuration from the first argument or `feud-config.yaml`.
///
/// A missing default file falls back to defaults; a missing explicit path
/// is an error. Returns the path actually read, if any.
fn load_config() -> Result<(EconomyConfig, Option<PathBuf>), EngineError> {
    if let Some(explicit) = std::env::args_os().nth(1).map(PathBuf::from) {
        let config = EconomyConfig::from_file(&explicit)?;
        return Ok((config, Some(explicit)));
    }

    let config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if config_path.exists() {
        let config = EconomyConfig::from_file(&config_path)?;
        Ok((config, Some(config_path)))
    } else {
        let mut config = EconomyConfig::default();
        config.apply_env_overrides();
        Ok((config, None))
    }
}
