//! # Streamdef Config - Configuration Management
//!
//! Configuration is layered, later layers overriding earlier ones:
//!
//! 1. defaults declared with `#[serde(default)]`,
//! 2. an optional YAML/TOML/JSON file,
//! 3. environment variables prefixed with `STREAMDEF__`, nested with `__`
//!    (e.g. `STREAMDEF__LIMITS__MAX_SOURCES_PER_BRANCH=50`).
//!
//! ```yaml
//! logging: "info"
//! storage:
//!   backend: "memory"
//!   history_limit: 10000
//! limits:
//!   max_sources_per_branch: 100
//!   max_sinks_per_source: 100
//! retry:
//!   max_attempts: 10
//! ```

pub mod validation;

use std::{path::Path, time::Duration};

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_logging")]
    pub logging: String,

    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: default_logging(),
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            retry: RetryConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

fn default_logging() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Number of commits kept for resuming watches
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: default_backend(), history_limit: default_history_limit() }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_history_limit() -> usize {
    10_000
}

/// Per-parent entity caps and per-entity version caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_children")]
    pub max_sources_per_branch: u64,

    #[serde(default = "default_max_children")]
    pub max_sinks_per_source: u64,

    #[serde(default = "default_max_versions")]
    pub max_branch_versions: u64,

    #[serde(default = "default_max_versions")]
    pub max_source_versions: u64,

    #[serde(default = "default_max_versions")]
    pub max_sink_versions: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sources_per_branch: default_max_children(),
            max_sinks_per_source: default_max_children(),
            max_branch_versions: default_max_versions(),
            max_source_versions: default_max_versions(),
            max_sink_versions: default_max_versions(),
        }
    }
}

fn default_max_children() -> u64 {
    100
}

fn default_max_versions() -> u64 {
    1000
}

/// Retry policy of atomic operations on optimistic-concurrency conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    5
}

fn default_max_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Page size of the initial snapshot
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause before resuming an interrupted watch
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { batch_size: default_batch_size(), restart_delay_ms: default_restart_delay_ms() }
    }
}

impl WatchConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_restart_delay_ms() -> u64 {
    50
}

/// Load configuration from a file, with environment overrides.
///
/// A missing file is not an error; defaults and environment still apply.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let builder = ConfigBuilder::builder().add_source(File::from(path.as_ref()).required(false));

    let builder = builder.add_source(
        Environment::with_prefix("STREAMDEF").prefix_separator("__").separator("__").try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// Load configuration with defaults
///
/// Logs a warning and falls back to defaults when loading fails.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    match load(path.as_ref()) {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully from {:?}", path.as_ref());
            config
        },
        Err(e) => {
            tracing::warn!(
                "Failed to load config from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Config::default()
        },
    }
}
