//! # Streamdef Store - Key-Value Store Abstraction
//!
//! The repository layer needs four things from its store:
//!
//! - revisioned point reads and ordered prefix scans,
//! - multi-key transactions gated on the revisions observed by earlier reads,
//! - a single monotonic store revision advanced by every commit,
//! - a resumable change watch over a key prefix.
//!
//! [`KvStore`] captures exactly that contract. [`MemoryBackend`] implements it
//! in process for tests and single-node deployments.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          streamdef-repository                │
//! │   (atomic operations, cascades, watch)       │
//! ├──────────────────────────────────────────────┤
//! │               KvStore trait                  │
//! │  get · range · count · txn · watch · revision│
//! ├──────────────────────────────────────────────┤
//! │   MemoryBackend   │   (other backends)       │
//! └──────────────────────────────────────────────┘
//! ```

#![deny(unsafe_code)]

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
pub use streamdef_types::{Revision, StoreError, StoreResult};

pub mod factory;
pub mod memory;
pub mod metrics;

pub use factory::{BackendType, StoreFactory};
pub use memory::MemoryBackend;
pub use metrics::{MetricsSnapshot, OpTimer, StoreMetrics};

/// A stored key with its value and revision metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Revision of the commit that created the key.
    pub create_revision: Revision,
    /// Revision of the commit that last modified the key.
    pub mod_revision: Revision,
}

/// Options of a prefix scan.
#[derive(Debug, Clone, Default)]
pub struct RangeOptions {
    /// Maximum number of returned pairs, `None` for all.
    pub limit: Option<usize>,
    /// Return pairs in descending key order.
    pub descending: bool,
    /// Resume an ascending scan after this key (exclusive).
    pub start_after: Option<String>,
}

impl RangeOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn start_after(mut self, key: impl Into<String>) -> Self {
        self.start_after = Some(key.into());
        self
    }
}

/// Result of a prefix scan.
#[derive(Debug, Clone)]
pub struct Range {
    pub kvs: Vec<KeyValue>,
    /// Total number of keys under the prefix, ignoring limit and paging.
    pub count: u64,
    /// Store revision at which the scan was served.
    pub revision: Revision,
}

/// Result of a point read.
#[derive(Debug, Clone)]
pub struct GetResponse {
    pub kv: Option<KeyValue>,
    /// Store revision at which the read was served.
    pub revision: Revision,
}

/// Precondition of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compare {
    /// The key was last modified at exactly `mod_revision`, or is absent when `None`.
    Key { key: String, mod_revision: Option<Revision> },
    /// The prefix still holds `count` keys and none was modified after `max_mod_revision`.
    Prefix { prefix: String, count: u64, max_mod_revision: Revision },
}

/// A write applied by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl TxnOp {
    pub fn key(&self) -> &str {
        match self {
            TxnOp::Put { key, .. } | TxnOp::Delete { key } => key,
        }
    }
}

/// A conditional multi-key write.
///
/// All writes are applied at a single new revision, and only when every
/// comparison holds. Writes to the same key are applied in order, so the last
/// one wins.
#[derive(Debug, Clone, Default)]
pub struct Txn {
    pub compares: Vec<Compare>,
    pub ops: Vec<TxnOp>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, compare: Compare) -> Self {
        self.compares.push(compare);
        self
    }

    pub fn then(mut self, op: TxnOp) -> Self {
        self.ops.push(op);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnResponse {
    /// `false` when a comparison failed and nothing was written.
    pub succeeded: bool,
    /// Revision of the commit, or the current revision when nothing was written.
    pub revision: Revision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// A single key change delivered by a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// New state of the key. For deletes, the value is empty.
    pub kv: KeyValue,
    /// State of the key before the change, when it existed.
    pub prev: Option<KeyValue>,
}

impl Event {
    /// A put of a key that did not exist before.
    pub fn is_create(&self) -> bool {
        self.kind == EventKind::Put && self.kv.create_revision == self.kv.mod_revision
    }
}

/// All watched changes committed at one revision.
///
/// Events are ordered puts before deletes, then by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub revision: Revision,
    pub events: Vec<Event>,
}

pub type WatchStream = Pin<Box<dyn Stream<Item = StoreResult<WatchResponse>> + Send>>;

/// Transactional, revisioned key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<GetResponse>;

    /// Ordered scan of all keys starting with `prefix`.
    async fn range(&self, prefix: &str, options: RangeOptions) -> StoreResult<Range>;

    /// Number of keys starting with `prefix`, with the revision of the read.
    async fn count(&self, prefix: &str) -> StoreResult<(u64, Revision)>;

    async fn txn(&self, txn: Txn) -> StoreResult<TxnResponse>;

    async fn revision(&self) -> StoreResult<Revision>;

    /// Streams changes under `prefix` committed at `from_revision` or later.
    ///
    /// The stream yields [`StoreError::Compacted`] when `from_revision` is no
    /// longer in the change history, and a connection error when the watch is
    /// interrupted. It ends after yielding an error.
    fn watch(&self, prefix: &str, from_revision: Revision) -> WatchStream;
}
