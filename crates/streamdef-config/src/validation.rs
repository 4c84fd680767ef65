//! Configuration validation
//!
//! Collects every invalid value instead of stopping at the first one.

use thiserror::Error;

use crate::{Config, LimitsConfig, RetryConfig, StorageConfig, WatchConfig};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid log level: {0} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("Invalid backend: {0} (must be one of: memory)")]
    InvalidBackend(String),

    #[error("Invalid history limit: {0} (must be > 0)")]
    InvalidHistoryLimit(usize),

    #[error("Invalid limit {name}: {value} (must be > 0)")]
    InvalidLimit { name: &'static str, value: u64 },

    #[error("Invalid retry attempts: {0} (must be > 0)")]
    InvalidRetryAttempts(u32),

    #[error("Invalid retry backoff: initial {initial_ms}ms exceeds maximum {max_ms}ms")]
    InvalidBackoff { initial_ms: u64, max_ms: u64 },

    #[error("Invalid watch batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Validate complete configuration
pub fn validate(config: &Config) -> Result<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_logging(&config.logging) {
        errors.push(e);
    }
    errors.extend(validate_storage(&config.storage));
    errors.extend(validate_limits(&config.limits));
    errors.extend(validate_retry(&config.retry));
    if let Err(e) = validate_watch(&config.watch) {
        errors.push(e);
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

pub fn validate_logging(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::InvalidLogLevel(level.to_string())),
    }
}

pub fn validate_storage(config: &StorageConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.backend != "memory" {
        errors.push(ValidationError::InvalidBackend(config.backend.clone()));
    }
    if config.history_limit == 0 {
        errors.push(ValidationError::InvalidHistoryLimit(config.history_limit));
    }
    errors
}

pub fn validate_limits(config: &LimitsConfig) -> Vec<ValidationError> {
    [
        ("max_sources_per_branch", config.max_sources_per_branch),
        ("max_sinks_per_source", config.max_sinks_per_source),
        ("max_branch_versions", config.max_branch_versions),
        ("max_source_versions", config.max_source_versions),
        ("max_sink_versions", config.max_sink_versions),
    ]
    .into_iter()
    .filter(|(_, value)| *value == 0)
    .map(|(name, value)| ValidationError::InvalidLimit { name, value })
    .collect()
}

pub fn validate_retry(config: &RetryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.max_attempts == 0 {
        errors.push(ValidationError::InvalidRetryAttempts(config.max_attempts));
    }
    if config.initial_backoff_ms > config.max_backoff_ms {
        errors.push(ValidationError::InvalidBackoff {
            initial_ms: config.initial_backoff_ms,
            max_ms: config.max_backoff_ms,
        });
    }
    errors
}

pub fn validate_watch(config: &WatchConfig) -> Result<()> {
    if config.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(config.batch_size));
    }
    Ok(())
}
