//! Facade wiring the entity repositories together.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 DefinitionRepository                 │
//! ├──────────────────┬──────────────────┬────────────────┤
//! │ BranchRepository │ SourceRepository │ SinkRepository │
//! │                  │  parent: Branch  │ parent: Source │
//! └──────────────────┴──────────────────┴────────────────┘
//!          │ hooks            │ hooks            ▲
//!          └──── cascade ────►└──── cascade ─────┘
//!                          │
//!                          ▼
//!                  Arc<dyn KvStore>
//! ```

use std::sync::Arc;

use streamdef_config::{Config, LimitsConfig, RetryConfig, WatchConfig};
use streamdef_store::KvStore;
use streamdef_types::{Branch, Sink, Source};

use crate::branch::BranchRepository;
use crate::cascade::register_cascade;
use crate::entity::{EntityRepository, EntitySettings, ParentGuard, DEFAULT_PAGE_SIZE};
use crate::op::RetryPolicy;
use crate::plugins::Plugins;
use crate::sink::SinkRepository;
use crate::source::SourceRepository;
use crate::watch::WatchSettings;

/// Entry point to all definition repositories.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use streamdef_repository::DefinitionRepository;
/// use streamdef_store::MemoryBackend;
///
/// let repository = DefinitionRepository::builder()
///     .store(Arc::new(MemoryBackend::new()))
///     .build();
/// ```
pub struct DefinitionRepository {
    plugins: Arc<Plugins>,
    branches: Arc<BranchRepository>,
    sources: Arc<SourceRepository>,
    sinks: Arc<SinkRepository>,
}

#[bon::bon]
impl DefinitionRepository {
    /// Builds the repositories and registers the parent → child cascades.
    ///
    /// Pass `plugins` to share a registry that already holds other hooks;
    /// cascades are appended after them.
    #[builder]
    pub fn new(
        store: Arc<dyn KvStore>,
        #[builder(default)] limits: LimitsConfig,
        #[builder(default)] retry: RetryConfig,
        #[builder(default)] watch: WatchConfig,
        #[builder(default)] plugins: Arc<Plugins>,
    ) -> Self {
        let base = EntitySettings {
            max_versions: limits.max_branch_versions,
            max_per_parent: None,
            retry: RetryPolicy::from(&retry),
            page_size: DEFAULT_PAGE_SIZE,
            watch: WatchSettings::from(&watch),
        };

        let branches: Arc<BranchRepository> = Arc::new(EntityRepository::new(
            Arc::clone(&store),
            Arc::clone(&plugins),
            base,
            None,
        ));
        let sources: Arc<SourceRepository> = Arc::new(EntityRepository::new(
            Arc::clone(&store),
            Arc::clone(&plugins),
            EntitySettings {
                max_versions: limits.max_source_versions,
                max_per_parent: Some(limits.max_sources_per_branch),
                ..base
            },
            Some(Arc::clone(&branches) as Arc<dyn ParentGuard>),
        ));
        let sinks: Arc<SinkRepository> = Arc::new(EntityRepository::new(
            store,
            Arc::clone(&plugins),
            EntitySettings {
                max_versions: limits.max_sink_versions,
                max_per_parent: Some(limits.max_sinks_per_source),
                ..base
            },
            Some(Arc::clone(&sources) as Arc<dyn ParentGuard>),
        ));

        register_cascade::<Branch, Source>(&plugins, &sources);
        register_cascade::<Source, Sink>(&plugins, &sinks);

        Self { plugins, branches, sources, sinks }
    }
}

impl DefinitionRepository {
    /// Builds the repositories from a loaded configuration.
    pub fn from_config(store: Arc<dyn KvStore>, config: &Config) -> Self {
        Self::builder()
            .store(store)
            .limits(config.limits.clone())
            .retry(config.retry.clone())
            .watch(config.watch.clone())
            .build()
    }

    /// Hook registries; subscribers may add their own hooks.
    pub fn plugins(&self) -> &Arc<Plugins> {
        &self.plugins
    }

    pub fn branches(&self) -> &Arc<BranchRepository> {
        &self.branches
    }

    pub fn sources(&self) -> &Arc<SourceRepository> {
        &self.sources
    }

    pub fn sinks(&self) -> &Arc<SinkRepository> {
        &self.sinks
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use streamdef_store::{MemoryBackend, StoreFactory};

    use super::*;

    #[test]
    fn test_from_config_applies_limits() {
        let mut config = Config::default();
        config.limits.max_sources_per_branch = 7;
        config.limits.max_sink_versions = 3;
        config.retry.max_attempts = 2;

        let storage = &config.storage;
        let store = StoreFactory::from_settings(&storage.backend, storage.history_limit).unwrap();
        let repository = DefinitionRepository::from_config(store, &config);

        assert_eq!(repository.sources().settings().max_per_parent, Some(7));
        assert_eq!(repository.sinks().settings().max_versions, 3);
        assert_eq!(repository.branches().settings().max_per_parent, None);
        assert_eq!(repository.branches().settings().retry.max_attempts, 2);
    }

    #[test]
    fn test_cascades_are_registered() {
        let repository = DefinitionRepository::builder().store(Arc::new(MemoryBackend::new())).build();

        assert_eq!(repository.plugins().branch().len(), 4);
        assert_eq!(repository.plugins().source().len(), 4);
        assert!(repository.plugins().sink().is_empty());
    }
}
