//! Restartable change stream of active entities.
//!
//! A watch starts with a snapshot of every active record below the scope,
//! then follows the store's change feed from the snapshot revision:
//!
//! ```text
//!   Created { revision }                 snapshot revision
//!   Events  { Create, Create, ... }      snapshot, `batch_size` per update
//!   Events  { Update, Delete, ... }      one update per committed revision
//!   ...
//!   (transient error)                    resume from last revision + 1
//!   ...
//!   (history compacted)
//!   Restarted { reason, revision }       consumer drops its state
//!   Events  { Create, Create, ... }      fresh snapshot
//! ```
//!
//! Delivery is at-least-once: a change committed while the snapshot is being
//! paged can be delivered both in the snapshot and as a later event.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use streamdef_config::WatchConfig;
use streamdef_store::{Event, EventKind, KvStore, RangeOptions, Revision, StoreError};
use streamdef_types::{Definition, ObjectKey};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{RepositoryError, RepositoryResult};
use crate::schema::{Partition, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Maximum number of snapshot records per update.
    pub batch_size: usize,
    /// Pause before resuming after a transient error.
    pub restart_delay: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from(&WatchConfig::default())
    }
}

impl From<&WatchConfig> for WatchSettings {
    fn from(config: &WatchConfig) -> Self {
        Self { batch_size: config.batch_size, restart_delay: config.restart_delay() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Update,
    Delete,
}

/// Change of one active record.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent<E> {
    pub kind: WatchEventKind,
    /// Rendered entity key, e.g. `123/456/my-source`.
    pub key: String,
    /// New record; `None` for deletes.
    pub value: Option<E>,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchUpdate<E> {
    /// The watch started; a snapshot at `revision` follows.
    Created { revision: Revision },
    /// The change history was lost; drop all state, a fresh snapshot follows.
    Restarted { reason: String, revision: Revision },
    Events { revision: Revision, events: Vec<WatchEvent<E>> },
}

pub type WatchUpdateStream<E> = Pin<Box<dyn Stream<Item = RepositoryResult<WatchUpdate<E>>> + Send>>;

struct Snapshot<E> {
    revision: Revision,
    batches: Vec<Vec<WatchEvent<E>>>,
}

/// Snapshot of the active records under `prefix`, in pages of `batch_size`.
///
/// The revision of the first page is the snapshot revision.
async fn read_snapshot<E: Definition>(
    store: &dyn KvStore,
    schema: &Schema,
    prefix: &str,
    batch_size: usize,
) -> RepositoryResult<Snapshot<E>> {
    let mut revision: Option<Revision> = None;
    let mut batches = Vec::new();
    let mut after: Option<String> = None;

    loop {
        let mut options = RangeOptions::all().limit(batch_size);
        if let Some(key) = &after {
            options = options.start_after(key.clone());
        }
        let page =
            store.range(prefix, options).await.map_err(|e| RepositoryError::store("range", prefix, e))?;
        let snapshot_revision = *revision.get_or_insert(page.revision);
        let last_page = page.kvs.len() < batch_size;

        let mut batch = Vec::with_capacity(page.kvs.len());
        for kv in page.kvs {
            batch.push(WatchEvent {
                kind: WatchEventKind::Create,
                key: entity_key(schema, &kv.key),
                value: Some(serde_json::from_slice(&kv.value)?),
                revision: snapshot_revision,
            });
            after = Some(kv.key);
        }
        if !batch.is_empty() {
            batches.push(batch);
        }

        if last_page {
            return Ok(Snapshot { revision: revision.unwrap_or_default(), batches });
        }
    }
}

fn entity_key(schema: &Schema, store_key: &str) -> String {
    let partition = schema.partition(Partition::Active);
    store_key.strip_prefix(partition.as_str()).unwrap_or(store_key).to_string()
}

fn decode_event<E: Definition>(schema: &Schema, event: &Event) -> RepositoryResult<WatchEvent<E>> {
    let (kind, value) = match event.kind {
        EventKind::Put if event.is_create() => {
            (WatchEventKind::Create, Some(serde_json::from_slice(&event.kv.value)?))
        },
        EventKind::Put => (WatchEventKind::Update, Some(serde_json::from_slice(&event.kv.value)?)),
        EventKind::Delete => (WatchEventKind::Delete, None),
    };
    Ok(WatchEvent {
        kind,
        key: entity_key(schema, &event.kv.key),
        value,
        revision: event.kv.mod_revision,
    })
}

fn is_cancelled(shutdown: &watch::Receiver<()>) -> bool {
    shutdown.has_changed().unwrap_or(true)
}

/// Streams the active records of one entity type below `scope`.
///
/// The stream ends when `shutdown` changes or its sender is dropped.
pub fn get_all_and_watch<E: Definition>(
    store: Arc<dyn KvStore>,
    schema: Schema,
    scope: ObjectKey,
    settings: WatchSettings,
    mut shutdown: watch::Receiver<()>,
) -> WatchUpdateStream<E> {
    let batch_size = settings.batch_size.max(1);

    Box::pin(async_stream::stream! {
        let prefix = match schema.in_scope(Partition::Active, &scope) {
            Ok(prefix) => prefix,
            Err(err) => {
                yield Err(err);
                return;
            },
        };

        let mut resume_from: Option<Revision> = None;
        let mut restart_reason: Option<String> = None;

        loop {
            if is_cancelled(&shutdown) {
                return;
            }

            let from = match resume_from {
                Some(revision) => revision,
                None => {
                    let snapshot = tokio::select! {
                        snapshot = read_snapshot::<E>(store.as_ref(), &schema, &prefix, batch_size) => snapshot,
                        _ = shutdown.changed() => return,
                    };
                    match snapshot {
                        Ok(snapshot) => {
                            let revision = snapshot.revision;
                            match restart_reason.take() {
                                Some(reason) => {
                                    info!(kind = %schema.kind(), scope = %scope, revision = %revision, reason = %reason, "Watch restarted");
                                    yield Ok(WatchUpdate::Restarted { reason, revision });
                                },
                                None => {
                                    info!(kind = %schema.kind(), scope = %scope, revision = %revision, "Watch created");
                                    yield Ok(WatchUpdate::Created { revision });
                                },
                            }
                            for events in snapshot.batches {
                                yield Ok(WatchUpdate::Events { revision, events });
                            }
                            resume_from = Some(revision.next());
                            revision.next()
                        },
                        Err(err) => {
                            warn!(kind = %schema.kind(), scope = %scope, error = %err, "Watch snapshot failed, retrying");
                            tokio::select! {
                                _ = tokio::time::sleep(settings.restart_delay) => {},
                                _ = shutdown.changed() => return,
                            }
                            continue;
                        },
                    }
                },
            };

            let mut changes = store.watch(&prefix, from);
            loop {
                let next = tokio::select! {
                    next = changes.next() => next,
                    _ = shutdown.changed() => return,
                };
                match next {
                    Some(Ok(response)) => {
                        let mut events = Vec::with_capacity(response.events.len());
                        for event in &response.events {
                            match decode_event::<E>(&schema, event) {
                                Ok(event) => events.push(event),
                                Err(err) => {
                                    yield Err(err);
                                },
                            }
                        }
                        resume_from = Some(response.revision.next());
                        if !events.is_empty() {
                            yield Ok(WatchUpdate::Events { revision: response.revision, events });
                        }
                    },
                    Some(Err(err @ StoreError::Compacted { .. })) => {
                        warn!(kind = %schema.kind(), scope = %scope, error = %err, "Watch history compacted, restarting");
                        restart_reason = Some(err.to_string());
                        resume_from = None;
                        break;
                    },
                    Some(Err(err)) => {
                        warn!(kind = %schema.kind(), scope = %scope, error = %err, "Watch interrupted, resuming");
                        break;
                    },
                    None => {
                        warn!(kind = %schema.kind(), scope = %scope, "Watch ended, resuming");
                        break;
                    },
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(settings.restart_delay) => {},
                _ = shutdown.changed() => return,
            }
        }
    })
}
