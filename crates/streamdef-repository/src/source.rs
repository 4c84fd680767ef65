use streamdef_types::Source;

use crate::entity::EntityRepository;

/// Sources of branches, at most `max_sources_per_branch` active per branch.
pub type SourceRepository = EntityRepository<Source>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use streamdef_config::LimitsConfig;
    use streamdef_store::MemoryBackend;
    use streamdef_test_fixtures::{
        test_branch, test_branch_key, test_by, test_sink, test_sink_key, test_source, test_source_key, TestClock,
    };
    use streamdef_types::{ObjectKey, VersionNumber};

    use super::*;
    use crate::error::RepositoryError;
    use crate::DefinitionRepository;

    fn repository(limits: LimitsConfig) -> DefinitionRepository {
        DefinitionRepository::builder().store(Arc::new(MemoryBackend::new())).limits(limits).build()
    }

    async fn with_branch(limits: LimitsConfig) -> (DefinitionRepository, TestClock) {
        let repo = repository(limits);
        let clock = TestClock::new();
        repo.branches()
            .create(test_branch(test_branch_key()), clock.now(), test_by(), "Create branch")
            .run()
            .await
            .unwrap();
        (repo, clock)
    }

    #[tokio::test]
    async fn test_create_requires_branch() {
        let repo = repository(LimitsConfig::default());
        let clock = TestClock::new();

        let err = repo
            .sources()
            .create(test_source(test_source_key("my-source")), clock.now(), test_by(), "Create source")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "branch \"456\" not found in the project");
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let (repo, clock) = with_branch(LimitsConfig::default()).await;
        let sources = repo.sources();

        let source1 = sources
            .create(test_source(test_source_key("my-source-1")), clock.now(), test_by(), "Create source")
            .run()
            .await
            .unwrap();
        let source2 = sources
            .create(test_source(test_source_key("my-source-2")), clock.now(), test_by(), "Create source")
            .run()
            .await
            .unwrap();

        assert_eq!(sources.get(&source1.key).await.unwrap(), source1);
        assert_eq!(source1.version.number, VersionNumber(1));
        assert_eq!(source1.version.hash.len(), 16);

        let listed = sources.list_all(&ObjectKey::Branch(test_branch_key())).await.unwrap();
        assert_eq!(listed, vec![source1, source2]);

        let project = ObjectKey::Project(test_branch_key().project_id);
        assert_eq!(sources.list_all(&project).await.unwrap().len(), 2);
        assert!(sources.list_deleted_all(&project).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_rejects_non_ancestor_scope() {
        let (repo, _clock) = with_branch(LimitsConfig::default()).await;

        let err = repo
            .sources()
            .list_all(&ObjectKey::Source(test_source_key("my-source")))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update() {
        let (repo, clock) = with_branch(LimitsConfig::default()).await;
        let sources = repo.sources();
        let key = test_source_key("my-source");

        let created = sources.create(test_source(key.clone()), clock.now(), test_by(), "Create source").run().await.unwrap();

        let updated = sources
            .update(key.clone(), clock.now(), test_by(), "Rename", |mut source| {
                source.name = "Renamed".to_string();
                Ok(source)
            })
            .run()
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.version.number, VersionNumber(2));
        assert_eq!(updated.version.description, "Rename");
        assert_ne!(updated.version.hash, created.version.hash);
        assert_eq!(updated.created, created.created);

        // Invalid content
        let err = sources
            .update(key.clone(), clock.now(), test_by(), "Clear name", |mut source| {
                source.name.clear();
                Ok(source)
            })
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));

        // State fields are owned by the lifecycle operations
        let err = sources
            .update(key.clone(), clock.now(), test_by(), "Disable", |mut source| {
                source.switchable.disable(source.version.at.unwrap_or_default(), &test_by(), "x", false);
                Ok(source)
            })
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));

        // Closure error aborts
        let err = sources
            .update(key.clone(), clock.now(), test_by(), "Fail", |_source| {
                Err(RepositoryError::Validation("rejected".to_string()))
            })
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));

        assert_eq!(sources.get(&key).await.unwrap(), updated);

        // Not found
        let err = sources
            .update(test_source_key("missing"), clock.now(), test_by(), "Update", Ok)
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "source \"missing\" not found in the branch");
    }

    #[tokio::test]
    async fn test_sources_per_branch_limit() {
        let limits = LimitsConfig { max_sources_per_branch: 3, ..LimitsConfig::default() };
        let (repo, clock) = with_branch(limits).await;
        let sources = repo.sources();

        for i in 0..3 {
            sources
                .create(test_source(test_source_key(&format!("source-{i}"))), clock.now(), test_by(), "Create")
                .run()
                .await
                .unwrap();
        }

        let err = sources
            .create(test_source(test_source_key("source-3")), clock.now(), test_by(), "Create")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "source count limit reached in the branch, the maximum is 3");
        assert!(matches!(err, RepositoryError::CountLimitReached { .. }));

        // A deleted source frees its slot, and undelete checks the limit again.
        sources.soft_delete(test_source_key("source-0"), clock.now(), test_by()).run().await.unwrap();
        sources
            .create(test_source(test_source_key("source-3")), clock.now(), test_by(), "Create")
            .run()
            .await
            .unwrap();
        let err = sources.undelete(test_source_key("source-0"), clock.now(), test_by()).run().await.unwrap_err();
        assert_eq!(err.to_string(), "source count limit reached in the branch, the maximum is 3");
    }

    #[tokio::test]
    async fn test_version_limit() {
        let limits = LimitsConfig { max_source_versions: 3, ..LimitsConfig::default() };
        let (repo, clock) = with_branch(limits).await;
        let sources = repo.sources();
        let key = test_source_key("my-source");

        sources.create(test_source(key.clone()), clock.now(), test_by(), "Create").run().await.unwrap();
        sources.update(key.clone(), clock.now(), test_by(), "Update 1", Ok).run().await.unwrap();
        sources.update(key.clone(), clock.now(), test_by(), "Update 2", Ok).run().await.unwrap();

        let err = sources.update(key.clone(), clock.now(), test_by(), "Update 3", Ok).run().await.unwrap_err();
        assert_eq!(err.to_string(), "version count limit reached in the source, the maximum is 3");

        let err = sources.disable(key.clone(), clock.now(), test_by(), "reason").run().await.unwrap_err();
        assert!(matches!(err, RepositoryError::CountLimitReached { entity: "version", .. }));

        let err = sources.rollback(key.clone(), clock.now(), test_by(), VersionNumber(1)).run().await.unwrap_err();
        assert!(matches!(err, RepositoryError::CountLimitReached { entity: "version", .. }));

        // Soft delete writes no version record and is still allowed.
        sources.soft_delete(key, clock.now(), test_by()).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejects_ids_spanning_segments() {
        let (repo, clock) = with_branch(LimitsConfig::default()).await;
        let source_a = test_source_key("a");
        repo.sources().create(test_source(source_a.clone()), clock.now(), test_by(), "Create").run().await.unwrap();

        // "a/x" would place its sinks under the prefix of source "a".
        let err = repo
            .sources()
            .create(test_source(test_source_key("a/x")), clock.now(), test_by(), "Create")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
        assert_eq!(err.to_string(), "Validation error: source id \"a/x\" cannot contain \"/\"");

        let err = repo
            .sinks()
            .create(test_sink(test_sink_key("a", "x/k")), clock.now(), test_by(), "Create")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));

        let err = repo
            .sources()
            .create(test_source(test_source_key("")), clock.now(), test_by(), "Create")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: source id cannot be empty");

        let scope = ObjectKey::Branch(test_branch_key());
        let sources = repo.sources().list_all(&scope).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert!(repo.sinks().list_all(&ObjectKey::Source(source_a)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_run_into_updates_input() {
        let (repo, clock) = with_branch(LimitsConfig::default()).await;
        let mut source = test_source(test_source_key("my-source"));

        let created = repo
            .sources()
            .create(source.clone(), clock.now(), test_by(), "Create source")
            .run_into(&mut source)
            .await
            .unwrap();

        assert_eq!(source, created);
        assert_eq!(source.version.number, VersionNumber(1));
        assert!(source.created.at.is_some());
        assert!(source.switchable.is_enabled());
    }
}
