//! # Streamdef Observe - Logging Setup
//!
//! Installs the global `tracing` subscriber. Filtering follows `RUST_LOG` when
//! set and [`TracingConfig::default_filter`] otherwise.

#![deny(unsafe_code)]

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, bon::Builder)]
#[builder(on(String, into))]
pub struct TracingConfig {
    #[builder(default = "streamdef".to_string())]
    pub service_name: String,
    /// Filter directives used when `RUST_LOG` is not set
    #[builder(default = "info,streamdef=debug".to_string())]
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    #[builder(default)]
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl TracingConfig {
    /// Derive the default filter from a configured log level.
    pub fn with_level(mut self, level: &str) -> Self {
        self.default_filter = format!("{level},streamdef={level}");
        self
    }
}

/// Initialize tracing. A second call is a logged no-op.
pub fn init_tracing_with_config(config: TracingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let initialized = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).try_init()
    };

    if initialized.is_err() {
        tracing::debug!("Tracing already initialized, skipping");
        return Ok(());
    }

    tracing::info!(service = config.service_name, json = config.json, "Tracing initialized");

    Ok(())
}

/// Initialize tracing with default configuration
pub fn init_tracing() -> Result<()> {
    init_tracing_with_config(TracingConfig::default())
}
