//! Lifecycle propagation across Branch → Source → Sink.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use streamdef_repository::DefinitionRepository;
use streamdef_store::MemoryBackend;
use streamdef_test_fixtures::{
    test_branch, test_branch_key, test_by, test_sink, test_sink_key, test_source, test_source_key, TestClock,
};
use streamdef_types::{ObjectKey, VersionNumber};

struct Fixture {
    backend: MemoryBackend,
    repo: DefinitionRepository,
    clock: TestClock,
}

/// Branch 123/456 with sources s1, s2, each with sinks k1, k2.
async fn fixture() -> Fixture {
    streamdef_observe::init_tracing().unwrap();
    let backend = MemoryBackend::new();
    let repo = DefinitionRepository::builder().store(Arc::new(backend.clone())).build();
    let clock = TestClock::new();
    let by = test_by();

    repo.branches().create(test_branch(test_branch_key()), clock.now(), by.clone(), "Create").run().await.unwrap();
    for source in ["s1", "s2"] {
        repo.sources()
            .create(test_source(test_source_key(source)), clock.now(), by.clone(), "Create")
            .run()
            .await
            .unwrap();
        for sink in ["k1", "k2"] {
            repo.sinks()
                .create(test_sink(test_sink_key(source, sink)), clock.now(), by.clone(), "Create")
                .run()
                .await
                .unwrap();
        }
    }

    Fixture { backend, repo, clock }
}

fn branch_scope() -> ObjectKey {
    ObjectKey::Branch(test_branch_key())
}

#[tokio::test]
async fn test_branch_delete_and_undelete_cascade() {
    let Fixture { backend, repo, clock } = fixture().await;
    let by = test_by();

    repo.branches().soft_delete(test_branch_key(), clock.now(), by.clone()).run().await.unwrap();

    assert!(repo.sources().list_all(&branch_scope()).await.unwrap().is_empty());
    assert!(repo.sinks().list_all(&branch_scope()).await.unwrap().is_empty());

    let deleted_sources = repo.sources().list_deleted_all(&branch_scope()).await.unwrap();
    assert_eq!(deleted_sources.len(), 2);
    for source in &deleted_sources {
        assert!(source.soft_deletable.is_deleted_with_parent());
        assert_eq!(source.version.number, VersionNumber(1));
    }
    let deleted_sinks = repo.sinks().list_deleted_all(&branch_scope()).await.unwrap();
    assert_eq!(deleted_sinks.len(), 4);
    assert!(deleted_sinks.iter().all(|s| s.soft_deletable.is_deleted_with_parent()));

    // Only deleted records remain, no active record of any level.
    let active: Vec<String> =
        backend.dump("definition/").await.into_iter().map(|(k, _)| k).filter(|k| k.contains("/active/")).collect();
    assert!(active.is_empty(), "unexpected active keys: {active:?}");

    repo.branches().undelete(test_branch_key(), clock.now(), by).run().await.unwrap();

    let sources = repo.sources().list_all(&branch_scope()).await.unwrap();
    assert_eq!(sources.len(), 2);
    for source in &sources {
        assert!(!source.soft_deletable.is_deleted());
        assert!(source.soft_deletable.undeleted_at().is_some());
        // Cascaded undelete does not create a version.
        assert_eq!(source.version.number, VersionNumber(1));
    }
    assert_eq!(repo.sinks().list_all(&branch_scope()).await.unwrap().len(), 4);
    assert!(repo.sinks().list_deleted_all(&branch_scope()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_directly_deleted_child_stays_deleted() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();

    repo.sources().soft_delete(test_source_key("s1"), clock.now(), by.clone()).run().await.unwrap();
    repo.branches().soft_delete(test_branch_key(), clock.now(), by.clone()).run().await.unwrap();

    let s1 = repo.sources().get_deleted(&test_source_key("s1")).await.unwrap();
    assert!(s1.soft_deletable.is_deleted_directly());

    repo.branches().undelete(test_branch_key(), clock.now(), by).run().await.unwrap();

    assert!(repo.sources().get(&test_source_key("s1")).await.is_err());
    assert!(repo.sources().get(&test_source_key("s2")).await.is_ok());

    // Sinks of s1 were deleted with s1, which itself stays deleted.
    let sinks: Vec<String> = repo
        .sinks()
        .list_all(&branch_scope())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.key.to_string())
        .collect();
    assert_eq!(sinks, vec!["123/456/s2/k1".to_string(), "123/456/s2/k2".to_string()]);
}

#[tokio::test]
async fn test_undelete_requires_active_parent() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();

    repo.branches().soft_delete(test_branch_key(), clock.now(), by.clone()).run().await.unwrap();

    let err = repo.sources().undelete(test_source_key("s1"), clock.now(), by.clone()).run().await.unwrap_err();
    assert_eq!(err.to_string(), "branch \"456\" not found in the project");

    let err = repo.sinks().undelete(test_sink_key("s1", "k1"), clock.now(), by).run().await.unwrap_err();
    assert_eq!(err.to_string(), "branch \"456\" not found in the project");
}

#[tokio::test]
async fn test_direct_disable_wins_over_cascade() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();
    let sink = test_sink_key("s1", "k1");

    repo.sinks().disable(sink.clone(), clock.now(), by.clone(), "sink maintenance").run().await.unwrap();
    repo.sources().disable(test_source_key("s1"), clock.now(), by.clone(), "source maintenance").run().await.unwrap();

    let k1 = repo.sinks().get(&sink).await.unwrap();
    assert!(k1.switchable.is_disabled_directly());
    assert_eq!(k1.switchable.disabled.as_ref().unwrap().reason, "sink maintenance");

    let k2 = repo.sinks().get(&test_sink_key("s1", "k2")).await.unwrap();
    assert!(k2.switchable.is_disabled_with_parent());
    assert_eq!(k2.switchable.disabled.as_ref().unwrap().reason, "source maintenance");
    assert_eq!(k2.version.number, VersionNumber(1));

    repo.sources().enable(test_source_key("s1"), clock.now(), by).run().await.unwrap();

    assert!(repo.sinks().get(&sink).await.unwrap().switchable.is_disabled_directly());
    assert!(repo.sinks().get(&test_sink_key("s1", "k2")).await.unwrap().switchable.is_enabled());
}

#[tokio::test]
async fn test_branch_disable_reaches_sinks() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();

    repo.branches().disable(test_branch_key(), clock.now(), by.clone(), "frozen").run().await.unwrap();

    let sinks = repo.sinks().list_all(&branch_scope()).await.unwrap();
    assert_eq!(sinks.len(), 4);
    for sink in &sinks {
        assert!(sink.switchable.is_disabled_with_parent());
        assert_eq!(sink.switchable.disabled.as_ref().unwrap().reason, "frozen");
    }

    repo.branches().enable(test_branch_key(), clock.now(), by).run().await.unwrap();
    let sinks = repo.sinks().list_all(&branch_scope()).await.unwrap();
    assert!(sinks.iter().all(|s| s.switchable.is_enabled()));
}

#[tokio::test]
async fn test_repeated_disable_changes_nothing_below() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();

    repo.sources().disable(test_source_key("s1"), clock.now(), by.clone(), "first").run().await.unwrap();
    let before = repo.sinks().list_all(&ObjectKey::Source(test_source_key("s1"))).await.unwrap();

    repo.sources().disable(test_source_key("s1"), clock.now(), by, "second").run().await.unwrap();
    let after = repo.sinks().list_all(&ObjectKey::Source(test_source_key("s1"))).await.unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_recreate_restores_children() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();

    repo.sources().soft_delete(test_source_key("s1"), clock.now(), by.clone()).run().await.unwrap();
    assert!(repo.sinks().list_all(&ObjectKey::Source(test_source_key("s1"))).await.unwrap().is_empty());

    let recreated = repo
        .sources()
        .create(test_source(test_source_key("s1")), clock.now(), by, "Re-create")
        .run()
        .await
        .unwrap();
    assert_eq!(recreated.version.number, VersionNumber(2));

    let sinks = repo.sinks().list_all(&ObjectKey::Source(test_source_key("s1"))).await.unwrap();
    assert_eq!(sinks.len(), 2);
    assert!(sinks.iter().all(|s| s.soft_deletable.undeleted_at().is_some()));
}

#[tokio::test]
async fn test_undelete_after_parent_enabled_restores_enabled() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();
    let s1 = test_source_key("s1");

    repo.branches().disable(test_branch_key(), clock.now(), by.clone(), "frozen").run().await.unwrap();
    repo.sources().soft_delete(s1.clone(), clock.now(), by.clone()).run().await.unwrap();
    repo.branches().enable(test_branch_key(), clock.now(), by.clone()).run().await.unwrap();

    // The deleted records followed the branch while deleted.
    assert!(repo.sources().get_deleted(&s1).await.unwrap().switchable.is_enabled());

    let undeleted = repo.sources().undelete(s1.clone(), clock.now(), by).run().await.unwrap();
    assert!(undeleted.switchable.is_enabled());
    assert!(!undeleted.soft_deletable.is_deleted());

    let sinks = repo.sinks().list_all(&ObjectKey::Source(s1)).await.unwrap();
    assert_eq!(sinks.len(), 2);
    assert!(sinks.iter().all(|s| s.switchable.is_enabled()));
}

#[tokio::test]
async fn test_undelete_under_disabled_parent_stays_disabled() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();
    let s1 = test_source_key("s1");

    repo.sources().soft_delete(s1.clone(), clock.now(), by.clone()).run().await.unwrap();
    repo.branches().disable(test_branch_key(), clock.now(), by.clone(), "frozen").run().await.unwrap();

    let deleted = repo.sources().get_deleted(&s1).await.unwrap();
    assert!(deleted.switchable.is_disabled_with_parent());
    assert_eq!(deleted.switchable.disabled.as_ref().unwrap().reason, "frozen");

    let undeleted = repo.sources().undelete(s1.clone(), clock.now(), by).run().await.unwrap();
    assert!(undeleted.switchable.is_disabled_with_parent());
    let sinks = repo.sinks().list_all(&ObjectKey::Source(s1)).await.unwrap();
    assert!(sinks.iter().all(|s| s.switchable.is_disabled_with_parent()));
}

#[tokio::test]
async fn test_parent_enable_keeps_deleted_child_disabled_directly() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();
    let s1 = test_source_key("s1");

    repo.sources().disable(s1.clone(), clock.now(), by.clone(), "maintenance").run().await.unwrap();
    repo.sources().soft_delete(s1.clone(), clock.now(), by.clone()).run().await.unwrap();
    repo.branches().disable(test_branch_key(), clock.now(), by.clone(), "frozen").run().await.unwrap();
    repo.branches().enable(test_branch_key(), clock.now(), by).run().await.unwrap();

    let deleted = repo.sources().get_deleted(&s1).await.unwrap();
    assert!(deleted.switchable.is_disabled_directly());
    assert_eq!(deleted.switchable.disabled.as_ref().unwrap().reason, "maintenance");
}

#[tokio::test]
async fn test_recreate_takes_switchable_from_input() {
    let Fixture { repo, clock, .. } = fixture().await;
    let by = test_by();
    let s1 = test_source_key("s1");

    repo.branches().disable(test_branch_key(), clock.now(), by.clone(), "frozen").run().await.unwrap();
    repo.sources().soft_delete(s1.clone(), clock.now(), by.clone()).run().await.unwrap();
    repo.branches().enable(test_branch_key(), clock.now(), by.clone()).run().await.unwrap();

    let recreated =
        repo.sources().create(test_source(s1.clone()), clock.now(), by, "Re-create").run().await.unwrap();
    assert!(recreated.switchable.is_enabled());
    assert_eq!(recreated.version.number, VersionNumber(2));

    let sinks = repo.sinks().list_all(&ObjectKey::Source(s1)).await.unwrap();
    assert_eq!(sinks.len(), 2);
    assert!(sinks.iter().all(|s| s.switchable.is_enabled()));
}

#[tokio::test]
async fn test_store_layout() {
    let Fixture { backend, repo, clock } = fixture().await;

    repo.sinks().soft_delete(test_sink_key("s2", "k2"), clock.now(), test_by()).run().await.unwrap();

    let keys: Vec<String> = backend.dump("definition/sink/").await.into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        keys,
        vec![
            "definition/sink/active/123/456/s1/k1",
            "definition/sink/active/123/456/s1/k2",
            "definition/sink/active/123/456/s2/k1",
            "definition/sink/deleted/123/456/s2/k2",
            "definition/sink/version/123/456/s1/k1/0000000001",
            "definition/sink/version/123/456/s1/k2/0000000001",
            "definition/sink/version/123/456/s2/k1/0000000001",
            "definition/sink/version/123/456/s2/k2/0000000001",
        ]
    );

    let (_, raw) = backend
        .dump("definition/sink/active/123/456/s1/k1")
        .await
        .into_iter()
        .next()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["projectId"], 123);
    assert_eq!(json["sourceId"], "s1");
    assert_eq!(json["sinkId"], "k1");
    assert_eq!(json["version"]["number"], 1);
}
