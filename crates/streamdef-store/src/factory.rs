//! Store factory for creating backend instances
//!
//! Resolves a backend name from configuration into a shared [`KvStore`]
//! without exposing the concrete backend type to consumers.

use std::{str::FromStr, sync::Arc};

use tracing::info;

use crate::{KvStore, MemoryBackend, StoreError, StoreResult, memory::DEFAULT_HISTORY_LIMIT};

/// Store backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// In-memory store (tests, single-node development)
    Memory,
}

impl FromStr for BackendType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendType::Memory),
            _ => Err(StoreError::Internal(format!("Unknown backend type: {}", s))),
        }
    }
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Memory => "memory",
        }
    }
}

/// Store factory for creating backend instances
pub struct StoreFactory;

impl StoreFactory {
    pub fn create(backend: BackendType) -> StoreResult<Arc<dyn KvStore>> {
        Self::create_with_history_limit(backend, DEFAULT_HISTORY_LIMIT)
    }

    /// Create a backend keeping at most `history_limit` commits for watch replay
    pub fn create_with_history_limit(
        backend: BackendType,
        history_limit: usize,
    ) -> StoreResult<Arc<dyn KvStore>> {
        info!(backend = backend.as_str(), history_limit, "Creating store backend");
        match backend {
            BackendType::Memory => Ok(Arc::new(MemoryBackend::with_history_limit(history_limit))),
        }
    }

    /// Create a store from a backend name, as found in configuration
    pub fn from_name(name: &str) -> StoreResult<Arc<dyn KvStore>> {
        Self::create(name.parse()?)
    }

    /// Create a store from the `storage` section values of the configuration
    pub fn from_settings(name: &str, history_limit: usize) -> StoreResult<Arc<dyn KvStore>> {
        Self::create_with_history_limit(name.parse()?, history_limit)
    }
}
