//! Ownership scopes.
//!
//! Every effect and memo is owned by the owner that was running when it was
//! created. Owners form a tree: re-running or disposing an owner disposes
//! the subtree its previous run built. Roots are parentless owners that
//! never run; they exist so that a subsystem can own a group of effects
//! and tear them down together.

use std::fmt;

use super::context::ReactiveContext;
use super::effect::Cleanup;
use super::runtime::{with_runtime, OwnerKind};
use super::subscriber::OwnerId;

/// Handle to a node of the ownership tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    id: OwnerId,
}

impl Owner {
    pub(crate) fn from_id(id: OwnerId) -> Self {
        Self { id }
    }

    /// Get the owner's id.
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// The owner this one is attached to, if any.
    pub fn parent(&self) -> Option<Owner> {
        with_runtime(|rt| rt.owner_parent(self.id)).map(Owner::from_id)
    }

    /// Number of live owners created directly under this one.
    pub fn child_count(&self) -> usize {
        with_runtime(|rt| rt.child_count(self.id))
    }

    /// Dispose this owner and its subtree.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose_owner(self.id));
    }

    /// Check if the owner has been disposed.
    pub fn is_disposed(&self) -> bool {
        !with_runtime(|rt| rt.owner_exists(self.id))
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.id)
            .field("child_count", &self.child_count())
            .finish()
    }
}

/// Create a parentless owner and run `f` inside it, untracked.
///
/// Effects and memos created by `f` belong to the root and live until
/// `owner.dispose()` is called.
///
/// ```rust,ignore
/// let root = create_root(|owner| {
///     Effect::new(move || println!("{}", name.get()));
///     owner
/// });
/// root.dispose();
/// ```
pub fn create_root<R>(f: impl FnOnce(Owner) -> R) -> R {
    let id = with_runtime(|rt| rt.create_owner(None, OwnerKind::Root));
    let _ctx = ReactiveContext::enter_scope(Some(id));
    f(Owner::from_id(id))
}

/// The owner new effects and memos currently attach to.
pub fn get_current_owner() -> Option<Owner> {
    ReactiveContext::current_owner().map(Owner::from_id)
}

/// Run `f` with `owner` as the current owner and tracking suspended.
///
/// Used to create effects from callbacks that fire outside any run (event
/// handlers, resolved futures) while keeping them in the right subtree.
pub fn run_in_scope<R>(owner: Owner, f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_scope(Some(owner.id));
    f()
}

/// Run `f` without tracking the reads it performs.
///
/// Owners created inside still attach to the current owner.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Check whether reads made right now would subscribe a running owner.
pub fn is_tracking() -> bool {
    ReactiveContext::is_tracking()
}

/// Register `f` to run when the current owner re-runs or is disposed.
///
/// Registered cleanups run after the owner's children are disposed, in
/// registration order. Outside any owner the cleanup could never run; it
/// is dropped with a warning.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    let Some(owner) = ReactiveContext::current_owner() else {
        tracing::warn!("on_cleanup called outside an owner; the cleanup will never run");
        return;
    };
    if with_runtime(|rt| rt.add_cleanup(owner, Cleanup::new(f))).is_some() {
        tracing::warn!(owner = ?owner, "on_cleanup called on a disposed owner");
    }
}
