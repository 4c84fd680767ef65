//! Watch projection over the active partition.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use streamdef_config::WatchConfig;
use streamdef_repository::{DefinitionRepository, WatchEventKind, WatchUpdate, WatchUpdateStream};
use streamdef_store::{KvStore, MemoryBackend};
use streamdef_test_fixtures::{test_branch, test_branch_key, test_by, test_source, test_source_key, TestClock};
use streamdef_types::{ObjectKey, Source};
use tokio::sync::watch;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn setup(batch_size: usize) -> (DefinitionRepository, MemoryBackend, TestClock) {
    let backend = MemoryBackend::new();
    let repo = DefinitionRepository::builder()
        .store(Arc::new(backend.clone()))
        .watch(WatchConfig { batch_size, restart_delay_ms: 20 })
        .build();
    let clock = TestClock::new();
    repo.branches()
        .create(test_branch(test_branch_key()), clock.now(), test_by(), "Create")
        .run()
        .await
        .unwrap();
    (repo, backend, clock)
}

async fn create_source(repo: &DefinitionRepository, clock: &TestClock, id: &str) -> Source {
    repo.sources().create(test_source(test_source_key(id)), clock.now(), test_by(), "Create").run().await.unwrap()
}

async fn next(stream: &mut WatchUpdateStream<Source>) -> WatchUpdate<Source> {
    tokio::time::timeout(TIMEOUT, stream.next()).await.expect("watch timed out").expect("watch ended").unwrap()
}

fn event_summary(update: &WatchUpdate<Source>) -> Vec<(WatchEventKind, String)> {
    match update {
        WatchUpdate::Events { events, .. } => events.iter().map(|e| (e.kind, e.key.clone())).collect(),
        other => panic!("expected events, got {other:?}"),
    }
}

#[tokio::test]
async fn test_snapshot_then_changes() {
    let (repo, _backend, clock) = setup(2).await;
    for id in ["s1", "s2", "s3"] {
        create_source(&repo, &clock, id).await;
    }

    let (_tx, rx) = watch::channel(());
    let mut stream = repo.sources().get_all_and_watch(&ObjectKey::Branch(test_branch_key()), rx);

    let WatchUpdate::Created { revision } = next(&mut stream).await else {
        panic!("expected created");
    };

    // Snapshot in batches of two.
    let first = next(&mut stream).await;
    let second = next(&mut stream).await;
    assert_eq!(
        event_summary(&first),
        vec![(WatchEventKind::Create, "123/456/s1".to_string()), (WatchEventKind::Create, "123/456/s2".to_string())]
    );
    assert_eq!(event_summary(&second), vec![(WatchEventKind::Create, "123/456/s3".to_string())]);
    if let WatchUpdate::Events { revision: batch_revision, .. } = &second {
        assert_eq!(*batch_revision, revision);
    }

    // Incremental changes.
    create_source(&repo, &clock, "s4").await;
    assert_eq!(event_summary(&next(&mut stream).await), vec![(WatchEventKind::Create, "123/456/s4".to_string())]);

    repo.sources()
        .update(test_source_key("s1"), clock.now(), test_by(), "Update", |mut s: Source| {
            s.description = "changed".to_string();
            Ok(s)
        })
        .run()
        .await
        .unwrap();
    let update = next(&mut stream).await;
    assert_eq!(event_summary(&update), vec![(WatchEventKind::Update, "123/456/s1".to_string())]);
    if let WatchUpdate::Events { events, .. } = &update {
        assert_eq!(events[0].value.as_ref().unwrap().description, "changed");
    }

    repo.sources().soft_delete(test_source_key("s2"), clock.now(), test_by()).run().await.unwrap();
    assert_eq!(event_summary(&next(&mut stream).await), vec![(WatchEventKind::Delete, "123/456/s2".to_string())]);
}

#[tokio::test]
async fn test_cascade_arrives_as_one_update() {
    let (repo, _backend, clock) = setup(100).await;
    create_source(&repo, &clock, "s1").await;
    create_source(&repo, &clock, "s2").await;

    let (_tx, rx) = watch::channel(());
    let mut stream = repo.sources().get_all_and_watch(&ObjectKey::Project(test_branch_key().project_id), rx);
    assert!(matches!(next(&mut stream).await, WatchUpdate::Created { .. }));
    assert_eq!(event_summary(&next(&mut stream).await).len(), 2);

    repo.branches().soft_delete(test_branch_key(), clock.now(), test_by()).run().await.unwrap();
    assert_eq!(
        event_summary(&next(&mut stream).await),
        vec![(WatchEventKind::Delete, "123/456/s1".to_string()), (WatchEventKind::Delete, "123/456/s2".to_string())]
    );
}

#[tokio::test]
async fn test_resumes_after_interruption() {
    let (repo, backend, clock) = setup(100).await;
    create_source(&repo, &clock, "s1").await;

    let (_tx, rx) = watch::channel(());
    let mut stream = repo.sources().get_all_and_watch(&ObjectKey::Branch(test_branch_key()), rx);
    assert!(matches!(next(&mut stream).await, WatchUpdate::Created { .. }));
    assert_eq!(event_summary(&next(&mut stream).await).len(), 1);

    create_source(&repo, &clock, "s2").await;
    assert_eq!(event_summary(&next(&mut stream).await), vec![(WatchEventKind::Create, "123/456/s2".to_string())]);

    backend.interrupt_watchers();
    create_source(&repo, &clock, "s3").await;

    // Delivered once the watch resumed, without a restart.
    assert_eq!(event_summary(&next(&mut stream).await), vec![(WatchEventKind::Create, "123/456/s3".to_string())]);
    assert_eq!(backend.metrics().snapshot().watch_interrupted, 1);
}

#[tokio::test]
async fn test_restarts_after_compaction() {
    let (repo, backend, clock) = setup(100).await;
    create_source(&repo, &clock, "s1").await;

    let (_tx, rx) = watch::channel(());
    let mut stream = repo.sources().get_all_and_watch(&ObjectKey::Branch(test_branch_key()), rx);
    assert!(matches!(next(&mut stream).await, WatchUpdate::Created { .. }));
    assert_eq!(event_summary(&next(&mut stream).await).len(), 1);

    create_source(&repo, &clock, "s2").await;
    assert_eq!(event_summary(&next(&mut stream).await).len(), 1);

    backend.interrupt_watchers();
    create_source(&repo, &clock, "s3").await;
    create_source(&repo, &clock, "s4").await;
    backend.compact(backend.revision().await.unwrap()).await;

    let WatchUpdate::Restarted { reason, .. } = next(&mut stream).await else {
        panic!("expected restart");
    };
    assert!(!reason.is_empty());

    // Fresh snapshot of everything active.
    assert_eq!(
        event_summary(&next(&mut stream).await),
        vec![
            (WatchEventKind::Create, "123/456/s1".to_string()),
            (WatchEventKind::Create, "123/456/s2".to_string()),
            (WatchEventKind::Create, "123/456/s3".to_string()),
            (WatchEventKind::Create, "123/456/s4".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_shutdown_ends_stream() {
    let (repo, _backend, _clock) = setup(100).await;

    let (tx, rx) = watch::channel(());
    let mut stream = repo.sources().get_all_and_watch(&ObjectKey::Branch(test_branch_key()), rx);
    assert!(matches!(next(&mut stream).await, WatchUpdate::Created { .. }));

    tx.send(()).unwrap();
    let end = tokio::time::timeout(TIMEOUT, stream.next()).await.expect("watch did not stop");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_invalid_scope_is_an_error() {
    let (repo, _backend, _clock) = setup(100).await;

    let (_tx, rx) = watch::channel(());
    let mut stream = repo.sources().get_all_and_watch(&ObjectKey::Source(test_source_key("s1")), rx);
    assert!(stream.next().await.unwrap().is_err());
    assert!(stream.next().await.is_none());
}
