//! Generic versioned entity repository.
//!
//! Branches, sources and sinks share one implementation, parameterised by
//! the entity type. Each instance knows:
//!
//! - its store [`Schema`] (`definition/{kind}/{active|deleted|version}/...`)
//! - the repository of its parent level, for existence checks
//! - the per-parent count limit and the per-entity version limit
//!
//! Every mutating method returns an [`AtomicOp`]; nothing is written until
//! the caller runs it.
//!
//! # Save path
//!
//! ```text
//! op body ──► validate ──► fire hooks (may cascade into children) ──► write
//!                                                                      │
//!      deleted?  yes ─► delete active key, put deleted key             │
//!                no  ─► put active key, put version record (if new),   │
//!                       delete deleted key (if it was deleted)  ◄──────┘
//! ```
//!
//! Direct mutations (create, update, disable, enable, undelete, rollback)
//! append a version record. Soft delete and all cascaded changes rewrite the
//! current record only.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use streamdef_store::{KvStore, RangeOptions};
use streamdef_types::{By, DefinitionKey, ObjectKey, SoftDeletable, Version, VersionNumber};
use tracing::debug;

use crate::error::{RepositoryError, RepositoryResult};
use crate::op::{AtomicOp, RetryPolicy, TxnBuilder};
use crate::plugins::{Hooked, Plugins, SaveContext};
use crate::schema::{Partition, Schema};
use crate::watch::{self, WatchSettings, WatchUpdateStream};

/// Lazily paged sequence of decoded records.
pub type EntityStream<E> = Pin<Box<dyn Stream<Item = RepositoryResult<E>> + Send>>;

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Limits and tuning of one entity repository.
#[derive(Debug, Clone, Copy)]
pub struct EntitySettings {
    /// Maximum number of version records per entity.
    pub max_versions: u64,
    /// Maximum number of active entities per parent, `None` for unlimited.
    pub max_per_parent: Option<u64>,
    pub retry: RetryPolicy,
    /// Page size of list scans.
    pub page_size: usize,
    pub watch: WatchSettings,
}

impl Default for EntitySettings {
    fn default() -> Self {
        Self {
            max_versions: 1000,
            max_per_parent: None,
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            watch: WatchSettings::default(),
        }
    }
}

/// Change applied to the children of a parent whose lifecycle changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeAction {
    /// Soft delete every active child, marking it deleted with the parent.
    Delete,
    /// Undelete every child deleted with the parent.
    Undelete,
    /// Disable every enabled child with the given reason.
    Disable { reason: String },
    /// Enable every child disabled with the parent.
    Enable,
}

/// Existence check of a parent level, used by child repositories.
#[async_trait]
pub trait ParentGuard: Send + Sync {
    /// Fails with `NotFound` unless `key` and all of its ancestors are active.
    ///
    /// The reads are recorded in `txn`, so a concurrent delete of any ancestor
    /// fails the commit.
    async fn exists_or_err(&self, txn: &TxnBuilder, key: &ObjectKey) -> RepositoryResult<()>;
}

pub struct EntityRepository<E: Hooked> {
    store: Arc<dyn KvStore>,
    plugins: Arc<Plugins>,
    schema: Schema,
    settings: EntitySettings,
    parent: Option<Arc<dyn ParentGuard>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Hooked> EntityRepository<E> {
    pub fn new(
        store: Arc<dyn KvStore>,
        plugins: Arc<Plugins>,
        settings: EntitySettings,
        parent: Option<Arc<dyn ParentGuard>>,
    ) -> Self {
        Self { store, plugins, schema: Schema::new(E::KIND), settings, parent, _entity: PhantomData }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn settings(&self) -> &EntitySettings {
        &self.settings
    }

    fn atomic<R, F, Fut>(&self, name: &'static str, body: F) -> AtomicOp<R>
    where
        R: Send + 'static,
        F: Fn(TxnBuilder) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = RepositoryResult<R>> + Send + 'static,
    {
        AtomicOp::new(name, Arc::clone(&self.store), self.settings.retry, body)
    }

    // ===== Reads =====

    async fn read_one(&self, key: &str) -> RepositoryResult<Option<E>> {
        let response =
            self.store.get(key).await.map_err(|e| RepositoryError::store("get", key, e))?;
        match response.kv {
            Some(kv) => Ok(Some(serde_json::from_slice(&kv.value)?)),
            None => Ok(None),
        }
    }

    /// Current record of an active entity.
    pub async fn get(&self, key: &E::Key) -> RepositoryResult<E> {
        self.read_one(&self.schema.active(key))
            .await?
            .ok_or_else(|| RepositoryError::not_found(E::KIND, key.id()))
    }

    /// Current record of a soft-deleted entity.
    pub async fn get_deleted(&self, key: &E::Key) -> RepositoryResult<E> {
        self.read_one(&self.schema.deleted(key))
            .await?
            .ok_or_else(|| RepositoryError::deleted_not_found(E::KIND, key.id()))
    }

    /// One version record of an entity, active or deleted.
    pub async fn version(&self, key: &E::Key, number: VersionNumber) -> RepositoryResult<E> {
        self.read_one(&self.schema.version(key, number))
            .await?
            .ok_or_else(|| RepositoryError::version_not_found(E::KIND, &key.id(), number))
    }

    /// Active entities below `scope`, ordered by key.
    pub fn list(&self, scope: &ObjectKey) -> EntityStream<E> {
        self.scan_scope(Partition::Active, scope)
    }

    /// Soft-deleted entities below `scope`, ordered by key.
    pub fn list_deleted(&self, scope: &ObjectKey) -> EntityStream<E> {
        self.scan_scope(Partition::Deleted, scope)
    }

    /// Version records of one entity, oldest first.
    pub fn versions(&self, key: &E::Key) -> EntityStream<E> {
        self.scan(self.schema.versions_of(key))
    }

    pub async fn list_all(&self, scope: &ObjectKey) -> RepositoryResult<Vec<E>> {
        self.list(scope).try_collect().await
    }

    pub async fn list_deleted_all(&self, scope: &ObjectKey) -> RepositoryResult<Vec<E>> {
        self.list_deleted(scope).try_collect().await
    }

    pub async fn versions_all(&self, key: &E::Key) -> RepositoryResult<Vec<E>> {
        self.versions(key).try_collect().await
    }

    /// Snapshot plus change stream of the active entities below `scope`.
    ///
    /// See [`crate::watch`] for the delivered updates.
    pub fn get_all_and_watch(
        &self,
        scope: &ObjectKey,
        shutdown: tokio::sync::watch::Receiver<()>,
    ) -> WatchUpdateStream<E> {
        watch::get_all_and_watch(
            Arc::clone(&self.store),
            self.schema,
            scope.clone(),
            self.settings.watch,
            shutdown,
        )
    }

    fn scan_scope(&self, partition: Partition, scope: &ObjectKey) -> EntityStream<E> {
        match self.schema.in_scope(partition, scope) {
            Ok(prefix) => self.scan(prefix),
            Err(err) => Box::pin(futures::stream::once(async move { Err(err) })),
        }
    }

    fn scan(&self, prefix: String) -> EntityStream<E> {
        let store = Arc::clone(&self.store);
        let page_size = self.settings.page_size.max(1);

        Box::pin(async_stream::try_stream! {
            let mut after: Option<String> = None;
            loop {
                let mut options = RangeOptions::all().limit(page_size);
                if let Some(key) = &after {
                    options = options.start_after(key.clone());
                }
                let page = store
                    .range(&prefix, options)
                    .await
                    .map_err(|e| RepositoryError::store("range", prefix.clone(), e))?;
                let last_page = page.kvs.len() < page_size;

                for kv in page.kvs {
                    let entity: E = serde_json::from_slice(&kv.value)?;
                    after = Some(kv.key);
                    yield entity;
                }

                if last_page {
                    break;
                }
            }
        })
    }

    // ===== Transactional reads =====

    pub(crate) async fn read_active(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<Option<E>> {
        txn.get_json(&self.schema.active(key)).await
    }

    pub(crate) async fn read_deleted(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<Option<E>> {
        txn.get_json(&self.schema.deleted(key)).await
    }

    async fn require_active(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<E> {
        self.read_active(txn, key)
            .await?
            .ok_or_else(|| RepositoryError::not_found(E::KIND, key.id()))
    }

    async fn latest_version(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<Option<E>> {
        let range = txn
            .range(&self.schema.versions_of(key), RangeOptions::all().descending().limit(1))
            .await?;
        match range.kvs.first() {
            Some(kv) => Ok(Some(serde_json::from_slice(&kv.value)?)),
            None => Ok(None),
        }
    }

    /// Fails unless the entity and its ancestors are active.
    pub async fn check_exists(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<()> {
        ParentGuard::exists_or_err(self, txn, &key.clone().into()).await
    }

    /// Fails with `AlreadyExists` when the entity is active.
    pub async fn check_not_exists(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<()> {
        if self.read_active(txn, key).await?.is_some() {
            return Err(RepositoryError::already_exists(E::KIND, key.id()));
        }
        Ok(())
    }

    async fn check_parent(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<()> {
        match &self.parent {
            Some(parent) => parent.exists_or_err(txn, &key.parent()).await,
            None => Ok(()),
        }
    }

    async fn check_per_parent_limit(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<()> {
        let Some(limit) = self.settings.max_per_parent else {
            return Ok(());
        };
        let prefix = self.schema.in_scope(Partition::Active, &key.parent())?;
        let count = txn.count(&prefix).await?;
        if count + 1 > limit {
            return Err(RepositoryError::CountLimitReached {
                entity: E::KIND.as_str(),
                limit,
                parent: E::KIND.parent_name(),
            });
        }
        Ok(())
    }

    async fn check_version_limit(&self, txn: &TxnBuilder, key: &E::Key) -> RepositoryResult<()> {
        let count = txn.count(&self.schema.versions_of(key)).await?;
        if count + 1 > self.settings.max_versions {
            return Err(RepositoryError::CountLimitReached {
                entity: "version",
                limit: self.settings.max_versions,
                parent: E::KIND.as_str(),
            });
        }
        Ok(())
    }

    // ===== Operations =====

    /// Existence check as a composable operation.
    pub fn exists_or_err(self: &Arc<Self>, key: E::Key) -> AtomicOp<()> {
        let repo = Arc::clone(self);
        self.atomic("exists_or_err", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            async move { repo.check_exists(&txn, &key).await }
        })
    }

    /// Fails with `AlreadyExists` when the entity is active.
    pub fn must_not_exist(self: &Arc<Self>, key: E::Key) -> AtomicOp<()> {
        let repo = Arc::clone(self);
        self.atomic("must_not_exist", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            async move { repo.check_not_exists(&txn, &key).await }
        })
    }

    /// Creates the entity, or re-creates it over its soft-deleted record.
    ///
    /// A re-created entity continues the version sequence of the deleted
    /// record, and its children deleted together with it are restored. The
    /// switchable state always comes from `input`.
    ///
    /// `input` is taken by value; to keep using the caller's copy, write the
    /// stored record back into it:
    ///
    /// ```ignore
    /// repo.create(source.clone(), now, by, "Create source.").run_into(&mut source).await?;
    /// ```
    pub fn create(
        self: &Arc<Self>,
        input: E,
        now: DateTime<Utc>,
        by: By,
        description: impl Into<String>,
    ) -> AtomicOp<E> {
        let repo = Arc::clone(self);
        let description = description.into();
        self.atomic("create", move |txn| {
            let repo = Arc::clone(&repo);
            let input = input.clone();
            let by = by.clone();
            let description = description.clone();
            async move {
                let key = input.key().clone();
                key.validate().map_err(RepositoryError::Validation)?;
                repo.check_parent(&txn, &key).await?;
                repo.check_per_parent_limit(&txn, &key).await?;
                repo.check_not_exists(&txn, &key).await?;

                let deleted = repo.read_deleted(&txn, &key).await?;
                let mut created = input;
                match &deleted {
                    Some(deleted) => {
                        repo.check_version_limit(&txn, &key).await?;
                        *created.created_mut() = deleted.created().clone();
                        *created.version_mut() = deleted.version().clone();
                        *created.soft_deletable_mut() = deleted.soft_deletable().clone();
                        created.soft_deletable_mut().undelete(now, &by);
                    },
                    None => {
                        created.created_mut().set_creation(now, &by);
                        *created.version_mut() = Version::default();
                        *created.soft_deletable_mut() = SoftDeletable::default();
                    },
                }
                let switchable = created.switchable_mut();
                if switchable.disabled.is_none() && switchable.enabled.is_none() {
                    switchable.enable(now, &by);
                }
                created.increment_version(now, &by, description)?;

                let ctx = SaveContext::new(txn, now, by);
                repo.save(&ctx, deleted.as_ref(), &created, true).await?;
                Ok(created)
            }
        })
    }

    /// Applies `update` to the current record and stores the result as a new version.
    ///
    /// The closure may change any content field. Changing the key or the
    /// disabled/deleted state is rejected; creation metadata is preserved.
    pub fn update<F>(
        self: &Arc<Self>,
        key: E::Key,
        now: DateTime<Utc>,
        by: By,
        description: impl Into<String>,
        update: F,
    ) -> AtomicOp<E>
    where
        F: Fn(E) -> RepositoryResult<E> + Send + Sync + 'static,
    {
        let repo = Arc::clone(self);
        let description = description.into();
        let update = Arc::new(update);
        self.atomic("update", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            let by = by.clone();
            let description = description.clone();
            let update = Arc::clone(&update);
            async move {
                let old = repo.require_active(&txn, &key).await?;
                repo.check_version_limit(&txn, &key).await?;

                let mut updated = update(old.clone())?;
                if updated.key() != old.key() {
                    return Err(RepositoryError::Validation(format!(
                        "{} key cannot be changed by an update",
                        E::KIND
                    )));
                }
                if updated.switchable() != old.switchable() {
                    return Err(RepositoryError::Validation(format!(
                        "{} disabled state cannot be changed by an update, use disable or enable",
                        E::KIND
                    )));
                }
                if updated.soft_deletable() != old.soft_deletable() {
                    return Err(RepositoryError::Validation(format!(
                        "{} deleted state cannot be changed by an update, use soft delete or undelete",
                        E::KIND
                    )));
                }
                *updated.created_mut() = old.created().clone();
                *updated.version_mut() = old.version().clone();
                updated.increment_version(now, &by, description)?;

                let ctx = SaveContext::new(txn, now, by);
                repo.save(&ctx, Some(&old), &updated, true).await?;
                Ok(updated)
            }
        })
    }

    /// Disables the entity directly and cascades to its enabled children.
    pub fn disable(
        self: &Arc<Self>,
        key: E::Key,
        now: DateTime<Utc>,
        by: By,
        reason: impl Into<String>,
    ) -> AtomicOp<E> {
        let repo = Arc::clone(self);
        let reason = reason.into();
        self.atomic("disable", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            let by = by.clone();
            let reason = reason.clone();
            async move {
                let old = repo.require_active(&txn, &key).await?;
                repo.check_version_limit(&txn, &key).await?;

                let mut updated = old.clone();
                updated.switchable_mut().disable(now, &by, reason, false);
                updated.increment_version(now, &by, "Disabled.")?;

                let ctx = SaveContext::new(txn, now, by);
                repo.save(&ctx, Some(&old), &updated, true).await?;
                Ok(updated)
            }
        })
    }

    /// Enables the entity directly and re-enables children disabled with it.
    pub fn enable(self: &Arc<Self>, key: E::Key, now: DateTime<Utc>, by: By) -> AtomicOp<E> {
        let repo = Arc::clone(self);
        self.atomic("enable", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            let by = by.clone();
            async move {
                let old = repo.require_active(&txn, &key).await?;
                repo.check_version_limit(&txn, &key).await?;

                let mut updated = old.clone();
                updated.switchable_mut().enable(now, &by);
                updated.increment_version(now, &by, "Enabled.")?;

                let ctx = SaveContext::new(txn, now, by);
                repo.save(&ctx, Some(&old), &updated, true).await?;
                Ok(updated)
            }
        })
    }

    /// Moves the entity to the deleted partition and cascades to its children.
    ///
    /// The version number is unchanged and no version record is written.
    pub fn soft_delete(self: &Arc<Self>, key: E::Key, now: DateTime<Utc>, by: By) -> AtomicOp<E> {
        let repo = Arc::clone(self);
        self.atomic("soft_delete", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            let by = by.clone();
            async move {
                let old = repo.require_active(&txn, &key).await?;

                let mut updated = old.clone();
                updated.soft_deletable_mut().delete(now, &by, true);

                let ctx = SaveContext::new(txn, now, by);
                repo.save(&ctx, Some(&old), &updated, false).await?;
                Ok(updated)
            }
        })
    }

    /// Restores a soft-deleted entity as a new version.
    ///
    /// The parent has to be active and have room for one more child.
    /// Children deleted together with the entity are restored too.
    pub fn undelete(self: &Arc<Self>, key: E::Key, now: DateTime<Utc>, by: By) -> AtomicOp<E> {
        let repo = Arc::clone(self);
        self.atomic("undelete", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            let by = by.clone();
            async move {
                repo.check_parent(&txn, &key).await?;
                repo.check_per_parent_limit(&txn, &key).await?;

                let deleted = repo
                    .read_deleted(&txn, &key)
                    .await?
                    .ok_or_else(|| RepositoryError::deleted_not_found(E::KIND, key.id()))?;
                repo.check_version_limit(&txn, &key).await?;

                let mut updated = deleted.clone();
                updated.soft_deletable_mut().undelete(now, &by);
                let description = format!("Undeleted to version \"{}\".", deleted.version_number().0);
                updated.increment_version(now, &by, description)?;

                let ctx = SaveContext::new(txn, now, by);
                repo.save(&ctx, Some(&deleted), &updated, true).await?;
                Ok(updated)
            }
        })
    }

    /// Stores the content of an older version as a new version.
    ///
    /// The creation metadata and the disabled/deleted state of the current
    /// record are kept.
    pub fn rollback(
        self: &Arc<Self>,
        key: E::Key,
        now: DateTime<Utc>,
        by: By,
        to: VersionNumber,
    ) -> AtomicOp<E> {
        let repo = Arc::clone(self);
        self.atomic("rollback", move |txn| {
            let repo = Arc::clone(&repo);
            let key = key.clone();
            let by = by.clone();
            async move {
                let current = repo.require_active(&txn, &key).await?;
                let latest = repo
                    .latest_version(&txn, &key)
                    .await?
                    .ok_or_else(|| RepositoryError::not_found(E::KIND, key.id()))?;
                let target: E = txn
                    .get_json(&repo.schema.version(&key, to))
                    .await?
                    .ok_or_else(|| RepositoryError::version_not_found(E::KIND, &key.id(), to))?;
                repo.check_version_limit(&txn, &key).await?;

                let mut updated = target.clone();
                *updated.created_mut() = current.created().clone();
                *updated.switchable_mut() = current.switchable().clone();
                *updated.soft_deletable_mut() = current.soft_deletable().clone();
                *updated.version_mut() = if latest.version_number() > current.version_number() {
                    latest.version().clone()
                } else {
                    current.version().clone()
                };
                let description = format!("Rollback to version \"{}\".", target.version_number().0);
                updated.increment_version(now, &by, description)?;

                let ctx = SaveContext::new(txn, now, by);
                repo.save(&ctx, Some(&current), &updated, true).await?;
                Ok(updated)
            }
        })
    }

    // ===== Cascade =====

    /// Applies `action` to every entity below `scope`, inside the caller's transaction.
    ///
    /// Children already in the target state are skipped, so applying the same
    /// cascade twice changes nothing the second time.
    pub async fn cascade(
        &self,
        ctx: &SaveContext,
        scope: &ObjectKey,
        action: &CascadeAction,
    ) -> RepositoryResult<()> {
        // Deleted children follow the switchable state of their parent too,
        // so an undelete never restores a stale disabled-with-parent flag.
        let partitions: &[Partition] = match action {
            CascadeAction::Delete => &[Partition::Active],
            CascadeAction::Undelete => &[Partition::Deleted],
            CascadeAction::Disable { .. } | CascadeAction::Enable => {
                &[Partition::Active, Partition::Deleted]
            },
        };
        let mut children: Vec<E> = Vec::new();
        for partition in partitions {
            children.extend(ctx.txn.range_json::<E>(&self.schema.in_scope(*partition, scope)?).await?);
        }

        let mut changed = 0usize;
        for old in children {
            let mut updated = old.clone();
            match action {
                CascadeAction::Delete => {
                    if updated.soft_deletable().is_deleted() {
                        continue;
                    }
                    updated.soft_deletable_mut().delete(ctx.now, &ctx.by, false);
                },
                CascadeAction::Undelete => {
                    if !updated.soft_deletable().is_deleted_with_parent() {
                        continue;
                    }
                    updated.soft_deletable_mut().undelete(ctx.now, &ctx.by);
                },
                CascadeAction::Disable { reason } => {
                    if updated.switchable().is_disabled() {
                        continue;
                    }
                    updated.switchable_mut().disable(ctx.now, &ctx.by, reason.clone(), true);
                },
                CascadeAction::Enable => {
                    if !updated.switchable().is_disabled_with_parent() {
                        continue;
                    }
                    updated.switchable_mut().enable(ctx.now, &ctx.by);
                },
            }
            self.save(ctx, Some(&old), &updated, false).await?;
            changed += 1;
        }

        if changed > 0 {
            debug!(kind = %E::KIND, scope = %scope, action = ?action, changed, "Cascaded lifecycle change");
        }
        Ok(())
    }

    // ===== Save =====

    async fn save(
        &self,
        ctx: &SaveContext,
        old: Option<&E>,
        updated: &E,
        record_version: bool,
    ) -> RepositoryResult<()> {
        updated.validate().map_err(RepositoryError::Validation)?;
        E::hooks(&self.plugins).fire(ctx, old, updated).await?;

        let key = updated.key();
        if updated.soft_deletable().is_deleted() {
            if !old.is_some_and(|o| o.soft_deletable().is_deleted()) {
                ctx.txn.delete(self.schema.active(key));
            }
            ctx.txn.put_json(self.schema.deleted(key), updated)?;
        } else {
            ctx.txn.put_json(self.schema.active(key), updated)?;
            if record_version {
                ctx.txn.put_json(self.schema.version(key, updated.version_number()), updated)?;
            }
            if old.is_some_and(|o| o.soft_deletable().is_deleted()) {
                ctx.txn.delete(self.schema.deleted(key));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Hooked> ParentGuard for EntityRepository<E> {
    async fn exists_or_err(&self, txn: &TxnBuilder, key: &ObjectKey) -> RepositoryResult<()> {
        if let (Some(parent), Some(parent_key)) = (&self.parent, key.parent()) {
            parent.exists_or_err(txn, &parent_key).await?;
        }
        if txn.get(&self.schema.active(key)).await?.is_none() {
            return Err(RepositoryError::not_found(E::KIND, key.id()));
        }
        Ok(())
    }
}
