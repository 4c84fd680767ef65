//! Transaction builder shared by one attempt of an atomic operation.
//!
//! Every read goes straight to the store and leaves a precondition behind;
//! every write is buffered. At commit time the preconditions and the buffered
//! writes are submitted as one conditional transaction:
//!
//! ```text
//!   read step ──► store.get / store.range ──► Compare recorded
//!   write step ─► TxnOp buffered
//!   commit ─────► Txn { compares, ops } ──► succeeded? ──► Committed
//!                                                └──────► Conflict (retry)
//! ```
//!
//! Reads never observe the buffered writes of the same attempt.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use streamdef_store::{Compare, KeyValue, KvStore, Range, RangeOptions, Revision, Txn, TxnOp};

use crate::error::{RepositoryError, RepositoryResult};

#[derive(Default)]
struct TxnState {
    compares: Vec<Compare>,
    tracked_keys: HashSet<String>,
    tracked_prefixes: HashSet<String>,
    ops: Vec<TxnOp>,
}

impl TxnState {
    /// The first observation of a key wins; a later read of the same key that
    /// sees a newer revision fails the first compare at commit.
    fn track_key(&mut self, key: &str, mod_revision: Option<Revision>) {
        if self.tracked_keys.insert(key.to_string()) {
            self.compares.push(Compare::Key { key: key.to_string(), mod_revision });
        }
    }

    fn track_prefix(&mut self, prefix: &str, count: u64, max_mod_revision: Revision) {
        if self.tracked_prefixes.insert(prefix.to_string()) {
            self.compares.push(Compare::Prefix {
                prefix: prefix.to_string(),
                count,
                max_mod_revision,
            });
        }
    }
}

/// Result of submitting a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All writes were applied at this revision.
    Committed(Revision),
    /// Nothing was buffered, so nothing was submitted.
    ReadOnly,
    /// A precondition failed and nothing was written.
    Conflict,
}

/// Reads and buffered writes of one attempt.
///
/// Cheap to clone; clones share the same state, so cascades triggered by a
/// write contribute to the transaction of the operation that triggered them.
#[derive(Clone)]
pub struct TxnBuilder {
    store: Arc<dyn KvStore>,
    state: Arc<Mutex<TxnState>>,
}

impl TxnBuilder {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store, state: Arc::new(Mutex::new(TxnState::default())) }
    }

    fn state(&self) -> MutexGuard<'_, TxnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Reads =====

    /// Reads a key; the commit requires it to be unchanged (or still absent).
    pub async fn get(&self, key: &str) -> RepositoryResult<Option<KeyValue>> {
        let response =
            self.store.get(key).await.map_err(|e| RepositoryError::store("get", key, e))?;
        self.state().track_key(key, response.kv.as_ref().map(|kv| kv.mod_revision));
        Ok(response.kv)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> RepositoryResult<Option<T>> {
        match self.get(key).await? {
            Some(kv) => Ok(Some(serde_json::from_slice(&kv.value)?)),
            None => Ok(None),
        }
    }

    /// Scans a prefix; the commit requires no key under it to be added,
    /// removed or modified.
    pub async fn range(&self, prefix: &str, options: RangeOptions) -> RepositoryResult<Range> {
        let range = self
            .store
            .range(prefix, options)
            .await
            .map_err(|e| RepositoryError::store("range", prefix, e))?;
        self.state().track_prefix(prefix, range.count, range.revision);
        Ok(range)
    }

    /// Decodes every value under a prefix, in key order.
    pub async fn range_json<T: DeserializeOwned>(&self, prefix: &str) -> RepositoryResult<Vec<T>> {
        let range = self.range(prefix, RangeOptions::all()).await?;
        range
            .kvs
            .iter()
            .map(|kv| serde_json::from_slice(&kv.value).map_err(RepositoryError::from))
            .collect()
    }

    /// Counts the keys under a prefix, with the same precondition as [`range`](Self::range).
    pub async fn count(&self, prefix: &str) -> RepositoryResult<u64> {
        let (count, revision) =
            self.store.count(prefix).await.map_err(|e| RepositoryError::store("count", prefix, e))?;
        self.state().track_prefix(prefix, count, revision);
        Ok(count)
    }

    // ===== Writes =====

    pub fn put_json<T: Serialize>(&self, key: String, value: &T) -> RepositoryResult<()> {
        let value = serde_json::to_vec(value)?;
        self.state().ops.push(TxnOp::Put { key, value });
        Ok(())
    }

    pub fn delete(&self, key: String) {
        self.state().ops.push(TxnOp::Delete { key });
    }

    /// Number of buffered writes.
    pub fn write_count(&self) -> usize {
        self.state().ops.len()
    }

    // ===== Commit =====

    pub(crate) async fn commit(&self) -> RepositoryResult<CommitOutcome> {
        let txn = {
            let state = self.state();
            if state.ops.is_empty() {
                return Ok(CommitOutcome::ReadOnly);
            }
            Txn { compares: state.compares.clone(), ops: state.ops.clone() }
        };

        let response =
            self.store.txn(txn).await.map_err(|e| RepositoryError::store("txn", "", e))?;
        if response.succeeded {
            Ok(CommitOutcome::Committed(response.revision))
        } else {
            Ok(CommitOutcome::Conflict)
        }
    }
}
