//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Creating a memo does not run it. The first read runs the computation
//!    and caches the result.
//!
//! 2. When read again, if no dependency has changed, the cached value is
//!    returned without recomputing.
//!
//! 3. When a dependency changes, the memo is marked dirty and passes the
//!    notification on to its own readers. It does not recompute yet.
//!
//! 4. On next access, a dirty memo recomputes with a fresh dependency set.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually read will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! A memo is an owner like an effect: effects or memos created inside its
//! computation belong to it and are disposed when it recomputes.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::ReactiveContext;
use super::owner::{untrack, Owner};
use super::runtime::{try_with_runtime, with_runtime, OwnerKind};
use super::subscriber::{OwnerId, Reactive, SourceId};

/// Cache state of a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed, or the memo never ran. The next read recomputes.
    Dirty,

    /// The memo was disposed. Reads return the last cached value.
    Disposed,
}

struct MemoInner<T> {
    owner: OwnerId,
    source: SourceId,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        try_with_runtime(|rt| {
            rt.dispose_owner(self.owner);
            rt.remove_source(self.source);
        });
    }
}

/// Puts the memo back to dirty if its computation unwinds, so the next
/// read retries instead of serving a value that was never produced.
struct DirtyOnUnwind(OwnerId);

impl Drop for DirtyOnUnwind {
    fn drop(&mut self) {
        if std::thread::panicking() {
            try_with_runtime(|rt| rt.mark_memo_dirty(self.0));
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let count_clone = count.clone();
/// let doubled = Memo::new(move || count_clone.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

impl<T: 'static> Memo<T> {
    /// Create a memo owned by the current owner, if any.
    ///
    /// `compute` does not run until the first read.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let parent = ReactiveContext::current_owner();
        let (owner, source) = with_runtime(|rt| {
            let source = rt.create_source();
            let owner = rt.create_owner(
                parent,
                OwnerKind::Memo {
                    source,
                    dirty: true,
                },
            );
            (owner, source)
        });

        Self {
            inner: Rc::new(MemoInner {
                owner,
                source,
                compute: Box::new(compute),
                value: RefCell::new(None),
            }),
        }
    }

    /// Get the current value, recomputing first if dirty.
    ///
    /// Inside a running effect or memo this also subscribes it to the memo.
    ///
    /// # Panics
    ///
    /// If called from the memo's own computation, directly or through other
    /// memos: a memo cannot depend on itself. Also propagates a panic from
    /// the computation, after which the memo stays dirty.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing first if dirty.
    ///
    /// Panics like [`get`](Memo::get).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.assert_not_computing();
        self.track();
        self.with_untracked(f)
    }

    /// Get the current value without subscribing the caller.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Borrow the current value without subscribing the caller.
    ///
    /// Panics like [`get`](Memo::get).
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.assert_not_computing();
        self.refresh();
        let value = self.inner.value.borrow();
        f(value.as_ref().expect("memo has a value after refresh"))
    }

    fn assert_not_computing(&self) {
        if with_runtime(|rt| rt.is_running(self.inner.owner)) {
            panic!("memo {:?} read itself while computing", self.inner.owner);
        }
    }

    fn refresh(&self) {
        let inner = &self.inner;
        match with_runtime(|rt| rt.take_memo_dirty(inner.owner)) {
            Some(true) => {
                let _unwind = DirtyOnUnwind(inner.owner);
                with_runtime(|rt| {
                    rt.run_owner(inner.owner, || {
                        let value = (inner.compute)();
                        let previous = inner.value.replace(Some(value));
                        drop(previous);
                        None
                    })
                });
            }
            Some(false) => {}
            None => {
                if inner.value.borrow().is_none() {
                    let value = untrack(|| (inner.compute)());
                    inner.value.replace(Some(value));
                }
            }
        }
    }

    /// Get the memo's cache state.
    pub fn state(&self) -> MemoState {
        match with_runtime(|rt| rt.memo_dirty(self.inner.owner)) {
            Some(true) => MemoState::Dirty,
            Some(false) => MemoState::Clean,
            None => MemoState::Disposed,
        }
    }

    /// Check if the memo needs recomputation.
    pub fn is_dirty(&self) -> bool {
        self.state() == MemoState::Dirty
    }

    /// The memo viewed as an owner.
    pub fn owner(&self) -> Owner {
        Owner::from_id(self.inner.owner)
    }

    /// Dispose the memo: unsubscribe it from its dependencies and drop its
    /// readers. The last cached value stays readable.
    pub fn dispose(&self) {
        with_runtime(|rt| {
            rt.dispose_owner(self.inner.owner);
            rt.remove_source(self.inner.source);
        });
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Reactive::subscriber_count(self)
    }

    /// Get the number of sources read during the last computation.
    pub fn dependency_count(&self) -> usize {
        with_runtime(|rt| rt.dependency_count(self.inner.owner))
    }
}

impl<T: 'static> Reactive for Memo<T> {
    fn source_id(&self) -> SourceId {
        self.inner.source
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("owner", &self.inner.owner)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
