//! Lifecycle hooks.
//!
//! Every save of an entity fires hooks registered for its type, inside the
//! transaction of the operation being saved. A hook that returns an error
//! aborts the whole operation. Cascades between parents and children are
//! plain hooks; any other subscriber can register the same way.
//!
//! Events are derived from the old and new state of the entity:
//!
//! | event      | fired when                                   |
//! |------------|----------------------------------------------|
//! | `Save`     | always                                       |
//! | `Delete`   | active before, deleted after                 |
//! | `Undelete` | deleted before (or re-created), active after |
//! | `Disable`  | enabled before, disabled after               |
//! | `Enable`   | disabled before, enabled after               |

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use streamdef_types::{Branch, By, Definition, Sink, Source};

use crate::error::RepositoryResult;
use crate::op::TxnBuilder;

/// Everything a hook needs to contribute to the running transaction.
#[derive(Clone)]
pub struct SaveContext {
    pub txn: TxnBuilder,
    pub now: DateTime<Utc>,
    pub by: By,
}

impl SaveContext {
    pub fn new(txn: TxnBuilder, now: DateTime<Utc>, by: By) -> Self {
        Self { txn, now, by }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Save,
    Delete,
    Undelete,
    Disable,
    Enable,
}

/// Events implied by a transition from `old` to `updated`, in firing order.
pub fn transitions<E: Definition>(old: Option<&E>, updated: &E) -> Vec<LifecycleEvent> {
    let mut events = vec![LifecycleEvent::Save];

    let was_deleted = old.is_some_and(|o| o.soft_deletable().is_deleted());
    match (was_deleted, updated.soft_deletable().is_deleted()) {
        (false, true) => events.push(LifecycleEvent::Delete),
        (true, false) => events.push(LifecycleEvent::Undelete),
        _ => {},
    }

    let was_disabled = old.is_some_and(|o| o.switchable().is_disabled());
    match (was_disabled, updated.switchable().is_disabled()) {
        (false, true) => events.push(LifecycleEvent::Disable),
        (true, false) => events.push(LifecycleEvent::Enable),
        _ => {},
    }

    events
}

/// A registered hook: `(context, old, updated)`.
pub type Hook<E> =
    Arc<dyn Fn(SaveContext, Option<E>, E) -> BoxFuture<'static, RepositoryResult<()>> + Send + Sync>;

/// Hooks of one entity type.
pub struct HookRegistry<E> {
    hooks: RwLock<Vec<(LifecycleEvent, Hook<E>)>>,
}

impl<E> Default for HookRegistry<E> {
    fn default() -> Self {
        Self { hooks: RwLock::new(Vec::new()) }
    }
}

impl<E: Definition> HookRegistry<E> {
    /// Registers a hook for one event. Hooks of an event fire in registration order.
    pub fn on<F, Fut>(&self, event: LifecycleEvent, hook: F)
    where
        F: Fn(SaveContext, Option<E>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        let hook: Hook<E> = Arc::new(move |ctx, old, updated| hook(ctx, old, updated).boxed());
        self.hooks.write().unwrap_or_else(PoisonError::into_inner).push((event, hook));
    }

    pub fn on_save<F, Fut>(&self, hook: F)
    where
        F: Fn(SaveContext, Option<E>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.on(LifecycleEvent::Save, hook);
    }

    pub fn on_delete<F, Fut>(&self, hook: F)
    where
        F: Fn(SaveContext, Option<E>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.on(LifecycleEvent::Delete, hook);
    }

    pub fn on_undelete<F, Fut>(&self, hook: F)
    where
        F: Fn(SaveContext, Option<E>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.on(LifecycleEvent::Undelete, hook);
    }

    pub fn on_disable<F, Fut>(&self, hook: F)
    where
        F: Fn(SaveContext, Option<E>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.on(LifecycleEvent::Disable, hook);
    }

    pub fn on_enable<F, Fut>(&self, hook: F)
    where
        F: Fn(SaveContext, Option<E>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.on(LifecycleEvent::Enable, hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hooks_for(&self, event: LifecycleEvent) -> Vec<Hook<E>> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, hook)| Arc::clone(hook))
            .collect()
    }

    /// Fires every hook matching the transition, stopping at the first error.
    pub(crate) async fn fire(
        &self,
        ctx: &SaveContext,
        old: Option<&E>,
        updated: &E,
    ) -> RepositoryResult<()> {
        for event in transitions(old, updated) {
            for hook in self.hooks_for(event) {
                hook(ctx.clone(), old.cloned(), updated.clone()).await?;
            }
        }
        Ok(())
    }
}

/// Hook registries of all entity types.
#[derive(Default)]
pub struct Plugins {
    branch: HookRegistry<Branch>,
    source: HookRegistry<Source>,
    sink: HookRegistry<Sink>,
}

impl Plugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch(&self) -> &HookRegistry<Branch> {
        &self.branch
    }

    pub fn source(&self) -> &HookRegistry<Source> {
        &self.source
    }

    pub fn sink(&self) -> &HookRegistry<Sink> {
        &self.sink
    }
}

/// Entity types with a hook registry in [`Plugins`].
pub trait Hooked: Definition {
    fn hooks(plugins: &Plugins) -> &HookRegistry<Self>;
}

impl Hooked for Branch {
    fn hooks(plugins: &Plugins) -> &HookRegistry<Self> {
        plugins.branch()
    }
}

impl Hooked for Source {
    fn hooks(plugins: &Plugins) -> &HookRegistry<Self> {
        plugins.source()
    }
}

impl Hooked for Sink {
    fn hooks(plugins: &Plugins) -> &HookRegistry<Self> {
        plugins.sink()
    }
}
