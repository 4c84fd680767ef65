//! Parent → child lifecycle propagation.
//!
//! ```text
//! Branch ──delete/undelete/disable/enable──► Sources ──same──► Sinks
//! ```
//!
//! Each edge is four hooks on the parent's registry. A hook only holds a weak
//! reference to the child repository, so dropping the repositories releases
//! them even though the registry outlives the wiring.

use std::sync::{Arc, Weak};

use streamdef_types::ObjectKey;

use crate::entity::{CascadeAction, EntityRepository};
use crate::plugins::{Hooked, LifecycleEvent, Plugins};

/// Wires the lifecycle of `P` into its children stored in `children`.
pub(crate) fn register_cascade<P: Hooked, C: Hooked>(
    plugins: &Plugins,
    children: &Arc<EntityRepository<C>>,
) {
    cascade_on::<P, C>(plugins, children, LifecycleEvent::Delete, |_| CascadeAction::Delete);
    cascade_on::<P, C>(plugins, children, LifecycleEvent::Undelete, |_| CascadeAction::Undelete);
    cascade_on::<P, C>(plugins, children, LifecycleEvent::Disable, |parent| {
        CascadeAction::Disable {
            reason: parent
                .switchable()
                .disabled
                .as_ref()
                .map(|d| d.reason.clone())
                .unwrap_or_default(),
        }
    });
    cascade_on::<P, C>(plugins, children, LifecycleEvent::Enable, |_| CascadeAction::Enable);
}

fn cascade_on<P: Hooked, C: Hooked>(
    plugins: &Plugins,
    children: &Arc<EntityRepository<C>>,
    event: LifecycleEvent,
    action: fn(&P) -> CascadeAction,
) {
    let children: Weak<EntityRepository<C>> = Arc::downgrade(children);
    P::hooks(plugins).on(event, move |ctx, _old, parent| {
        let children = children.clone();
        async move {
            let Some(children) = children.upgrade() else {
                return Ok(());
            };
            let scope: ObjectKey = parent.key().clone().into();
            children.cascade(&ctx, &scope, &action(&parent)).await
        }
    });
}
