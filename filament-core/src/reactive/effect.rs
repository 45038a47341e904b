//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued in the batch
//!    scheduler and re-runs when the scheduler flushes (right away for a
//!    write outside any batch).
//!
//! 3. Before re-running, the effect unsubscribes from its old dependencies,
//!    disposes the child owners its previous run created, and runs its
//!    cleanup. New dependencies are tracked during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! The effect function may return a [`Cleanup`]. It runs before the next
//! run and when the effect is disposed, after the effect's children and
//! subscriptions are gone. Useful for releasing listeners or timers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::owner::Owner;
use super::runtime::{with_runtime, OwnerKind};
use super::subscriber::{OwnerId, Reactive};

/// A deferred teardown action, run exactly once.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wrap a closure as a cleanup.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Return types an effect function may produce.
pub trait IntoCleanup {
    /// Convert into the cleanup to store, if any.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle is a plain id: copying or dropping it does not affect the
/// effect. An effect created while another owner is running is owned by
/// it and disposed when that owner re-runs or is disposed. A root-level
/// effect lives until [`dispose`](Effect::dispose) is called.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", count.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: OwnerId,
}

impl Effect {
    /// Create an effect owned by the current owner, if any, and run it once.
    ///
    /// A panic during this first run unwinds out of `new`.
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        Self::create(ReactiveContext::current_owner(), f)
    }

    /// Create an effect owned by `owner` regardless of the ambient owner.
    ///
    /// If `owner` is already disposed the effect becomes a root-level effect.
    pub fn with_owner<F, R>(owner: Owner, f: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        Self::create(Some(owner.id()), f)
    }

    fn create<F, R>(parent: Option<OwnerId>, mut f: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        let run: Rc<RefCell<dyn FnMut() -> Option<Cleanup>>> =
            Rc::new(RefCell::new(move || f().into_cleanup()));

        with_runtime(|rt| {
            let id = rt.create_owner(parent, OwnerKind::Effect(run));
            rt.run_effect(id);
            Self { id }
        })
    }

    /// Get the effect's owner id.
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// The effect viewed as an owner, e.g. for [`run_in_scope`](crate::reactive::run_in_scope).
    pub fn owner(&self) -> Owner {
        Owner::from_id(self.id)
    }

    /// Dispose of the effect and everything it owns.
    ///
    /// Children are disposed first, then the effect unsubscribes and runs
    /// its cleanup. After disposal the effect never runs again, even if a
    /// notification for it is already queued.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose_owner(self.id));
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !with_runtime(|rt| rt.owner_exists(self.id))
    }

    /// Get the number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        with_runtime(|rt| rt.dependency_count(self.id))
    }

    /// Check whether the last run read `source`.
    pub fn depends_on(&self, source: &impl Reactive) -> bool {
        with_runtime(|rt| rt.depends_on(self.id, source.source_id()))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
