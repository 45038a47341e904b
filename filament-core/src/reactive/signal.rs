//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a running effect or memo, the signal
//!    registers that owner as a subscriber.
//!
//! 2. When a signal's value changes, all subscribers are notified.
//!
//! 3. A write that is equal to the current value (per the signal's equality
//!    predicate) notifies nobody.
//!
//! # Memory Layout
//!
//! The value lives in the handle (`Rc<RefCell<T>>`); the subscriber set
//! lives in the runtime's source arena. Cloning a signal shares both.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::{try_with_runtime, with_runtime};
use super::subscriber::{Reactive, SignalId, SourceId};

pub(crate) type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

pub(crate) struct SignalInner<T> {
    pub(crate) id: SignalId,
    pub(crate) source: SourceId,
    pub(crate) value: RefCell<T>,
    pub(crate) equals: Equality<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        try_with_runtime(|rt| {
            rt.remove_source(self.source);
            if let Ok(mut table) = rt.snapshots.try_borrow_mut() {
                table.forget(self.id);
            }
        });
    }
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// count.update(|n| n + 1);
/// ```
pub struct Signal<T: 'static> {
    pub(crate) inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal that compares writes with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(value, T::eq)
    }

    /// Create a new signal with a custom equality predicate.
    ///
    /// A write for which `equals(current, next)` holds is dropped. A
    /// panicking predicate unwinds out of `set`.
    pub fn with_equals(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        let (id, source) = with_runtime(|rt| (rt.next_signal_id(), rt.create_source()));
        Self {
            inner: Rc::new(SignalInner {
                id,
                source,
                value: RefCell::new(value),
                equals: Box::new(equals),
            }),
        }
    }

    /// Create a signal that notifies on every write.
    pub fn always_notify(value: T) -> Self {
        Self::with_equals(value, |_, _| false)
    }

    /// Get the signal's stable id.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a running effect or memo, this also registers it
    /// as a subscriber.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking like [`get`](Signal::get).
    ///
    /// Writing this signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        self.with_untracked(f)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Borrow the current value without tracking dependencies.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers.
    ///
    /// Outside a batch, dependent effects have re-run by the time this
    /// returns (under the immediate scheduler).
    pub fn set(&self, value: T) {
        let unchanged = (self.inner.equals)(&self.inner.value.borrow(), &value);
        if unchanged {
            return;
        }

        // Drop the old value before notifying, outside the borrow.
        let previous = self.inner.value.replace(value);
        drop(previous);

        with_runtime(|rt| rt.propagate(self.inner.source));
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let current = self.inner.value.borrow();
            f(&current)
        };
        self.set(next);
    }

    /// Drop every subscriber. Reads keep working; writes reach nobody.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose_source(self.inner.source));
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Reactive::subscriber_count(self)
    }

    /// A read-only handle to the same signal.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            signal: self.clone(),
        }
    }

    /// A write-only handle to the same signal.
    pub fn write_only(&self) -> WriteSignal<T> {
        WriteSignal {
            signal: self.clone(),
        }
    }
}

impl<T: 'static> Reactive for Signal<T> {
    fn source_id(&self) -> SourceId {
        self.inner.source
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a signal and split it into read and write halves.
pub fn signal<T: PartialEq + 'static>(value: T) -> (ReadSignal<T>, WriteSignal<T>) {
    let signal = Signal::new(value);
    (signal.read_only(), signal.write_only())
}

/// The reading half of a [`Signal`].
pub struct ReadSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> ReadSignal<T> {
    /// See [`Signal::get`].
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.signal.get()
    }

    /// See [`Signal::with`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// See [`Signal::get_untracked`].
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.signal.get_untracked()
    }

    /// Get the signal's stable id.
    pub fn id(&self) -> SignalId {
        self.signal.id()
    }
}

impl<T: 'static> Reactive for ReadSignal<T> {
    fn source_id(&self) -> SourceId {
        self.signal.source_id()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

/// The writing half of a [`Signal`].
pub struct WriteSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> WriteSignal<T> {
    /// See [`Signal::set`].
    pub fn set(&self, value: T) {
        self.signal.set(value);
    }

    /// See [`Signal::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.signal.update(f);
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
