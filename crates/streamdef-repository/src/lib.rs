//! # Streamdef Repository
//!
//! Versioned storage of Branch → Source → Sink definitions on top of a
//! transactional key-value store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DefinitionRepository                     │
//! │          branches() ─── sources() ─── sinks()                │
//! └───────────────┬──────────────────────────────────────────────┘
//!                 │ AtomicOp (read → write → commit, retried)
//!                 ▼
//! ┌──────────────────────────────┐      ┌───────────────────────┐
//! │   EntityRepository<E>        │─────►│ Plugins (hooks)       │
//! │   create / update / disable  │      │ cascade to children   │
//! │   enable / soft_delete /     │◄─────│ external subscribers  │
//! │   undelete / rollback        │      └───────────────────────┘
//! └───────────────┬──────────────┘
//!                 │ TxnBuilder (tracked reads, buffered writes)
//!                 ▼
//!         Arc<dyn KvStore>  ◄──── watch projection (get_all_and_watch)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> streamdef_repository::RepositoryResult<()> {
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use streamdef_repository::DefinitionRepository;
//! use streamdef_store::MemoryBackend;
//! use streamdef_types::{Branch, BranchKey, By, Source};
//!
//! let repository = DefinitionRepository::builder().store(Arc::new(MemoryBackend::new())).build();
//! let by = By::user("user-1", "Jane");
//! let branch_key = BranchKey::new(123, 456);
//!
//! repository.branches().create(Branch::new(branch_key), Utc::now(), by.clone(), "Create branch").run().await?;
//! repository
//!     .sources()
//!     .create(Source::new(branch_key.source("my-source"), "My Source"), Utc::now(), by.clone(), "Create source")
//!     .run()
//!     .await?;
//!
//! // Deleting the branch deletes the source with it.
//! repository.branches().soft_delete(branch_key, Utc::now(), by).run().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod branch;
mod cascade;
pub mod entity;
pub mod error;
pub mod op;
pub mod plugins;
pub mod repository;
pub mod schema;
pub mod sink;
pub mod source;
pub mod watch;

pub use branch::BranchRepository;
pub use entity::{CascadeAction, EntityRepository, EntitySettings, EntityStream, ParentGuard};
pub use error::{ErrorKind, RepositoryError, RepositoryResult};
pub use op::{AtomicOp, CommitOutcome, RetryPolicy, TxnBuilder};
pub use plugins::{Hook, HookRegistry, Hooked, LifecycleEvent, Plugins, SaveContext};
pub use repository::DefinitionRepository;
pub use schema::{Partition, Schema};
pub use sink::SinkRepository;
pub use source::SourceRepository;
pub use watch::{WatchEvent, WatchEventKind, WatchSettings, WatchUpdate, WatchUpdateStream};
