//! Configuration loading and typed config structures for the Feud core.
//!
//! The configuration lives in `feud-config.yaml`. Every field has a serde
//! default, so a missing file, a missing section, or a missing key all fall
//! back to the values below.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use feud_arena::RegistryConfig;
use feud_types::ItemKind;

/// Environment variable overriding [`JournalConfig::path`].
pub const ENV_JOURNAL_PATH: &str = "FEUD_JOURNAL_PATH";

/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG_LEVEL: &str = "FEUD_LOG_LEVEL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration. Mirrors the structure of `feud-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EconomyConfig {
    /// Timed attempt defaults and defender rewards.
    #[serde(default)]
    pub attempts: AttemptsConfig,

    /// Attack memory settings.
    #[serde(default)]
    pub attacks: AttacksConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Durable ledger journal.
    #[serde(default)]
    pub journal: JournalConfig,

    /// Soak harness parameters.
    #[serde(default)]
    pub soak: SoakConfig,
}

impl EconomyConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `FEUD_JOURNAL_PATH` overrides `journal.path`
    /// - `FEUD_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_JOURNAL_PATH) {
            self.journal.path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
    }

    /// The registry settings derived from the `attempts` section.
    pub const fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            defenders_required: self.attempts.defenders_required,
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Timed attempt defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttemptsConfig {
    /// Points debited from the initiator when none is given.
    #[serde(default = "default_attempt_cost")]
    pub cost: i64,

    /// Counter window in milliseconds when none is given.
    #[serde(default = "default_attempt_window_ms")]
    pub window_ms: u64,

    /// Distinct defenders needed to block an attempt.
    #[serde(default = "default_defenders_required")]
    pub defenders_required: u32,

    /// Points awarded to each defender of a blocked attempt. Zero disables.
    #[serde(default = "default_defender_points")]
    pub defender_points: i64,

    /// Item awarded to each defender of a blocked attempt. `null` disables.
    #[serde(default = "default_defender_item")]
    pub defender_item: Option<ItemKind>,

    /// Units of `defender_item` awarded per defender.
    #[serde(default = "default_defender_item_count")]
    pub defender_item_count: u32,
}

impl Default for AttemptsConfig {
    fn default() -> Self {
        Self {
            cost: default_attempt_cost(),
            window_ms: default_attempt_window_ms(),
            defenders_required: default_defenders_required(),
            defender_points: default_defender_points(),
            defender_item: default_defender_item(),
            defender_item_count: default_defender_item_count(),
        }
    }
}

/// Attack memory settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttacksConfig {
    /// How long a target may counter an attack, in milliseconds.
    #[serde(default = "default_counter_window_ms")]
    pub counter_window_ms: u64,
}

impl Default for AttacksConfig {
    fn default() -> Self {
        Self {
            counter_window_ms: default_counter_window_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Durable ledger journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JournalConfig {
    /// JSON-lines file to append ledger entries to. In-memory only when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Soak harness parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SoakConfig {
    /// Number of concurrent simulated participants.
    #[serde(default = "default_participants")]
    pub participants: u32,

    /// Number of shared arenas participants compete for.
    #[serde(default = "default_arenas")]
    pub arenas: u32,

    /// How long participants keep issuing operations, in milliseconds.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Seed for the per-participant random generators.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Points granted to every participant up front.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: i64,

    /// Bombs and shields granted to every participant up front.
    #[serde(default = "default_starting_items")]
    pub starting_items: u32,

    /// Attempt and counter window used during the soak, in milliseconds.
    #[serde(default = "default_soak_window_ms")]
    pub window_ms: u64,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            participants: default_participants(),
            arenas: default_arenas(),
            duration_ms: default_duration_ms(),
            seed: default_seed(),
            starting_balance: default_starting_balance(),
            starting_items: default_starting_items(),
            window_ms: default_soak_window_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_attempt_cost() -> i64 {
    100
}

const fn default_attempt_window_ms() -> u64 {
    60_000
}

const fn default_defenders_required() -> u32 {
    1
}

const fn default_defender_points() -> i64 {
    50
}

#[allow(clippy::unnecessary_wraps)]
const fn default_defender_item() -> Option<ItemKind> {
    Some(ItemKind::Lockpick)
}

const fn default_defender_item_count() -> u32 {
    1
}

const fn default_counter_window_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_participants() -> u32 {
    16
}

const fn default_arenas() -> u32 {
    4
}

const fn default_duration_ms() -> u64 {
    3_000
}

const fn default_seed() -> u64 {
    42
}

const fn default_starting_balance() -> i64 {
    1_000
}

const fn default_starting_items() -> u32 {
    3
}

const fn default_soak_window_ms() -> u64 {
    150
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EconomyConfig::default();
        assert_eq!(config.attempts.cost, 100);
        assert_eq!(config.attempts.window_ms, 60_000);
        assert_eq!(config.attempts.defenders_required, 1);
        assert_eq!(config.attempts.defender_item, Some(ItemKind::Lockpick));
        assert_eq!(config.logging.format, LogFormat::Plain);
        assert!(config.journal.path.is_none());
        assert_eq!(config.registry().defenders_required, 1);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
attempts:
  cost: 25
  window_ms: 5000
  defenders_required: 2
  defender_points: 10
  defender_item: shield
  defender_item_count: 2

attacks:
  counter_window_ms: 1000

logging:
  level: debug
  format: json

journal:
  path: /tmp/feud-ledger.jsonl

soak:
  participants: 4
  arenas: 2
  duration_ms: 500
  seed: 7
  starting_balance: 300
  starting_items: 1
  window_ms: 50
";
        let mut config: EconomyConfig = serde_yml::from_str(yaml).unwrap();
        config.apply_overrides(|_| None);

        assert_eq!(config.attempts.cost, 25);
        assert_eq!(config.attempts.defender_item, Some(ItemKind::Shield));
        assert_eq!(config.registry().defenders_required, 2);
        assert_eq!(config.attacks.counter_window_ms, 1000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.journal.path,
            Some(PathBuf::from("/tmp/feud-ledger.jsonl"))
        );
        assert_eq!(config.soak.participants, 4);
        assert_eq!(config.soak.window_ms, 50);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: EconomyConfig = serde_yml::from_str("attacks:\n  counter_window_ms: 10\n").unwrap();
        assert_eq!(config.attacks.counter_window_ms, 10);
        assert_eq!(config.attempts, AttemptsConfig::default());
        assert_eq!(config.soak, SoakConfig::default());
    }

    #[test]
    fn sample_config_file_matches_defaults() {
        let config: EconomyConfig =
            serde_yml::from_str(include_str!("../../../feud-config.yaml")).unwrap();
        assert_eq!(config, EconomyConfig::default());
    }

    #[test]
    fn defender_item_can_be_disabled() {
        let config: EconomyConfig =
            serde_yml::from_str("attempts:\n  defender_item: null\n").unwrap();
        assert_eq!(config.attempts.defender_item, None);
    }

    #[test]
    fn overrides_replace_journal_and_level() {
        let mut config = EconomyConfig::default();
        config.apply_overrides(|key| match key {
            ENV_JOURNAL_PATH => Some(String::from("/var/lib/feud/ledger.jsonl")),
            ENV_LOG_LEVEL => Some(String::from("warn")),
            _ => None,
        });
        assert_eq!(
            config.journal.path,
            Some(PathBuf::from("/var/lib/feud/ledger.jsonl"))
        );
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn from_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feud-config.yaml");
        std::fs::write(&path, "attempts:\n  cost: 7\n").unwrap();

        let config = EconomyConfig::from_file(&path).unwrap();
        assert_eq!(config.attempts.cost, 7);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = EconomyConfig::parse("attempts: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
