//! In-memory [`KvStore`] backend.
//!
//! Keys live in an ordered map guarded by an async `RwLock`. Every successful
//! transaction that changes at least one key advances the store revision, is
//! appended to the change history and is broadcast to live watchers.
//!
//! The history keeps the last `history_limit` commits (see
//! [`MemoryBackend::with_history_limit`]); older entries are dropped on commit.
//! [`MemoryBackend::compact`] drops history explicitly, which lets tests
//! exercise the "watch from a compacted revision" path. Watchers can be
//! cut off with [`MemoryBackend::interrupt_watchers`] to simulate a lost
//! connection.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::{
    Compare, Event, EventKind, GetResponse, KeyValue, KvStore, Range, RangeOptions, Revision,
    StoreError, StoreResult, Txn, TxnOp, TxnResponse, WatchResponse, WatchStream,
    metrics::{OpTimer, StoreMetrics},
};

/// Capacity of the watch notification channel. A watcher lagging further
/// behind is disconnected and has to resume from its last revision.
const NOTIFY_CAPACITY: usize = 1024;

/// Number of commits kept in the change history by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    create_revision: Revision,
    mod_revision: Revision,
}

impl Entry {
    fn to_kv(&self, key: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: self.value.clone(),
            create_revision: self.create_revision,
            mod_revision: self.mod_revision,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    data: BTreeMap<String, Entry>,
    revision: Revision,
    history: VecDeque<Arc<WatchResponse>>,
    /// Oldest revision still present in `history`.
    compacted: Revision,
}

impl Inner {
    fn prefix_entries<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, &'a Entry)> {
        self.data
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
    }

    fn check(&self, compare: &Compare) -> bool {
        match compare {
            Compare::Key { key, mod_revision } => {
                self.data.get(key).map(|e| e.mod_revision) == *mod_revision
            },
            Compare::Prefix { prefix, count, max_mod_revision } => {
                let mut actual = 0u64;
                for (_, entry) in self.prefix_entries(prefix) {
                    if entry.mod_revision > *max_mod_revision {
                        return false;
                    }
                    actual += 1;
                }
                actual == *count
            },
        }
    }

    fn total_bytes(&self) -> u64 {
        self.data.iter().map(|(k, e)| (k.len() + e.value.len()) as u64).sum()
    }
}

#[derive(Debug, Clone)]
enum Notification {
    Committed(Arc<WatchResponse>),
    Interrupted,
}

/// In-memory transactional store.
///
/// Cloning is cheap; clones share the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<RwLock<Inner>>,
    notifier: broadcast::Sender<Notification>,
    metrics: Arc<StoreMetrics>,
    history_limit: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// A backend keeping at most `history_limit` commits for watch replay.
    ///
    /// Watches resuming from a dropped revision fail with [`StoreError::Compacted`].
    pub fn with_history_limit(history_limit: usize) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            notifier,
            metrics: Arc::new(StoreMetrics::new()),
            history_limit: history_limit.max(1),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Drops change history older than `revision`.
    ///
    /// Watches started from an older revision fail with [`StoreError::Compacted`].
    pub async fn compact(&self, revision: Revision) {
        let mut inner = self.inner.write().await;
        while inner.history.front().is_some_and(|r| r.revision < revision) {
            inner.history.pop_front();
        }
        inner.compacted = inner.compacted.max(revision);
        debug!(revision = %revision, "Compacted change history");
    }

    /// Disconnects all live watchers with a connection error.
    pub fn interrupt_watchers(&self) {
        let _ = self.notifier.send(Notification::Interrupted);
        self.metrics.record_watch_interrupted();
    }

    /// All pairs under `prefix`, values decoded as UTF-8. Intended for tests
    /// asserting on the raw store layout.
    pub async fn dump(&self, prefix: &str) -> Vec<(String, String)> {
        let inner = self.inner.read().await;
        inner
            .prefix_entries(prefix)
            .map(|(k, e)| (k.clone(), String::from_utf8_lossy(&e.value).into_owned()))
            .collect()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps only the events under `prefix`; `None` when nothing is left.
fn filter_response(response: &WatchResponse, prefix: &str) -> Option<WatchResponse> {
    let events: Vec<Event> =
        response.events.iter().filter(|e| e.kv.key.starts_with(prefix)).cloned().collect();
    if events.is_empty() {
        None
    } else {
        Some(WatchResponse { revision: response.revision, events })
    }
}

#[async_trait]
impl KvStore for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<GetResponse> {
        let timer = OpTimer::new();
        let inner = self.inner.read().await;
        let kv = inner.data.get(key).map(|e| e.to_kv(key));
        self.metrics.record_read(timer.elapsed(), false);
        Ok(GetResponse { kv, revision: inner.revision })
    }

    async fn range(&self, prefix: &str, options: RangeOptions) -> StoreResult<Range> {
        let timer = OpTimer::new();
        let inner = self.inner.read().await;

        let matching: Vec<(&String, &Entry)> = inner.prefix_entries(prefix).collect();
        let count = matching.len() as u64;

        let ordered: Box<dyn Iterator<Item = &(&String, &Entry)>> = if options.descending {
            Box::new(matching.iter().rev())
        } else {
            Box::new(matching.iter())
        };

        let kvs = ordered
            .filter(|(k, _)| match &options.start_after {
                Some(after) if options.descending => k.as_str() < after.as_str(),
                Some(after) => k.as_str() > after.as_str(),
                None => true,
            })
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|(k, e)| e.to_kv(k))
            .collect();

        self.metrics.record_read(timer.elapsed(), false);
        Ok(Range { kvs, count, revision: inner.revision })
    }

    async fn count(&self, prefix: &str) -> StoreResult<(u64, Revision)> {
        let timer = OpTimer::new();
        let inner = self.inner.read().await;
        let count = inner.prefix_entries(prefix).count() as u64;
        self.metrics.record_read(timer.elapsed(), false);
        Ok((count, inner.revision))
    }

    async fn txn(&self, txn: Txn) -> StoreResult<TxnResponse> {
        let timer = OpTimer::new();
        let mut inner = self.inner.write().await;

        if !txn.compares.iter().all(|c| inner.check(c)) {
            self.metrics.record_conflict();
            self.metrics.record_txn(timer.elapsed(), true);
            return Ok(TxnResponse { succeeded: false, revision: inner.revision });
        }

        let revision = inner.revision.next();
        let mut before: HashMap<String, Option<KeyValue>> = HashMap::new();

        for op in txn.ops {
            let key = op.key().to_string();
            if !before.contains_key(&key) {
                let prev = inner.data.get(&key).map(|e| e.to_kv(&key));
                before.insert(key.clone(), prev);
            }
            match op {
                TxnOp::Put { key, value } => {
                    let create_revision =
                        inner.data.get(&key).map_or(revision, |e| e.create_revision);
                    inner.data.insert(key, Entry { value, create_revision, mod_revision: revision });
                },
                TxnOp::Delete { key } => {
                    inner.data.remove(&key);
                },
            }
        }

        let mut events: Vec<Event> = before
            .into_iter()
            .filter_map(|(key, prev)| match (inner.data.get(&key), prev) {
                (Some(entry), prev) => {
                    Some(Event { kind: EventKind::Put, kv: entry.to_kv(&key), prev })
                },
                (None, Some(prev)) => Some(Event {
                    kind: EventKind::Delete,
                    kv: KeyValue {
                        key,
                        value: Vec::new(),
                        create_revision: prev.create_revision,
                        mod_revision: revision,
                    },
                    prev: Some(prev),
                }),
                (None, None) => None,
            })
            .collect();

        if events.is_empty() {
            self.metrics.record_txn(timer.elapsed(), false);
            return Ok(TxnResponse { succeeded: true, revision: inner.revision });
        }

        events.sort_by(|a, b| {
            let rank = |e: &Event| match e.kind {
                EventKind::Put => 0,
                EventKind::Delete => 1,
            };
            rank(a).cmp(&rank(b)).then_with(|| a.kv.key.cmp(&b.kv.key))
        });

        let response = Arc::new(WatchResponse { revision, events });
        inner.revision = revision;
        inner.history.push_back(Arc::clone(&response));
        if inner.history.len() > self.history_limit {
            while inner.history.len() > self.history_limit {
                inner.history.pop_front();
            }
            if let Some(oldest) = inner.history.front().map(|r| r.revision) {
                inner.compacted = inner.compacted.max(oldest);
            }
        }
        let _ = self.notifier.send(Notification::Committed(response));

        self.metrics.update_key_space(inner.data.len() as u64, inner.total_bytes());
        self.metrics.record_txn(timer.elapsed(), false);
        Ok(TxnResponse { succeeded: true, revision })
    }

    async fn revision(&self) -> StoreResult<Revision> {
        Ok(self.inner.read().await.revision)
    }

    fn watch(&self, prefix: &str, from_revision: Revision) -> WatchStream {
        let inner = Arc::clone(&self.inner);
        let mut rx = self.notifier.subscribe();
        let prefix = prefix.to_string();
        self.metrics.record_watch_started();

        Box::pin(async_stream::stream! {
            let (backlog, mut last) = {
                let inner = inner.read().await;
                if !from_revision.is_zero() && from_revision < inner.compacted {
                    yield Err(StoreError::Compacted {
                        requested: from_revision,
                        compacted: inner.compacted,
                    });
                    return;
                }
                let backlog: Vec<WatchResponse> = if from_revision.is_zero() {
                    Vec::new()
                } else {
                    inner
                        .history
                        .iter()
                        .filter(|r| r.revision >= from_revision)
                        .filter_map(|r| filter_response(r, &prefix))
                        .collect()
                };
                (backlog, inner.revision)
            };

            for response in backlog {
                yield Ok(response);
            }

            loop {
                match rx.recv().await {
                    Ok(Notification::Committed(response)) => {
                        if response.revision <= last {
                            continue;
                        }
                        last = response.revision;
                        if let Some(filtered) = filter_response(&response, &prefix) {
                            yield Ok(filtered);
                        }
                    },
                    Ok(Notification::Interrupted) => {
                        yield Err(StoreError::Connection("watch interrupted".to_string()));
                        break;
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(StoreError::Connection(format!(
                            "watcher lagged behind by {skipped} notifications"
                        )));
                        break;
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
