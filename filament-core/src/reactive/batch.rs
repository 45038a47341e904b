//! Batch Scheduler
//!
//! The scheduler decides how often downstream effects re-run when several
//! writes happen together.
//!
//! # Model
//!
//! - A depth counter tracks nested [`batch`] calls. Only the transition back
//!   to zero flushes, however deep the nesting.
//! - Notified effects go into an insertion-ordered pending set. Set
//!   semantics give de-duplication: an effect notified N times before the
//!   flush reaches it runs once.
//! - A flush pops owners from the front of the set one at a time. Owners
//!   queued while the flush is draining join the same flush, and owners
//!   disposed before their turn are skipped.
//!
//! # Errors
//!
//! Two flush policies exist. A write outside any batch flushes with
//! [`FlushPolicy::Propagate`]: a panicking effect unwinds straight back to
//! the writer, and the owners still queued stay pending for the next
//! flush. A batch end (and the host-driven [`flush`]) uses
//! [`FlushPolicy::Isolate`]: each run is wrapped in `catch_unwind`, failures
//! are logged, and the remaining owners still run.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexSet;

use super::runtime::{with_runtime, Runtime};
use super::subscriber::OwnerId;
use crate::config::SchedulerMode;

/// How a flush treats a panicking effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushPolicy {
    /// Let the panic unwind to whoever triggered the flush.
    Propagate,
    /// Log the panic and keep flushing.
    Isolate,
}

/// Depth counter and pending set for one runtime.
pub(crate) struct BatchScheduler {
    depth: Cell<usize>,
    pending: RefCell<IndexSet<OwnerId>>,
    flushing: Cell<bool>,
}

/// Clears the flushing flag even if an effect unwinds out of the flush.
struct FlushingGuard<'a>(&'a BatchScheduler);

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.flushing.set(false);
    }
}

impl BatchScheduler {
    pub(crate) fn new() -> Self {
        Self {
            depth: Cell::new(0),
            pending: RefCell::new(IndexSet::new()),
            flushing: Cell::new(false),
        }
    }

    pub(crate) fn start(&self) {
        let depth = self.depth.get();
        if depth == 0 {
            tracing::trace!("batch opened");
        }
        self.depth.set(depth + 1);
    }

    /// Close one level. Returns `true` when the outermost batch closed.
    pub(crate) fn end(&self) -> bool {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        depth == 0
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.depth.get() > 0
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    pub(crate) fn enqueue(&self, owner: OwnerId) {
        self.pending.borrow_mut().insert(owner);
    }

    pub(crate) fn forget(&self, owner: OwnerId) {
        self.pending.borrow_mut().shift_remove(&owner);
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    fn next(&self) -> Option<OwnerId> {
        self.pending.borrow_mut().shift_remove_index(0)
    }
}

impl Runtime {
    /// Flush unless a batch is open, a flush is already draining, or the
    /// frame scheduler is deferring work to the host.
    pub(crate) fn flush_if_idle(&self) {
        if self.scheduler.is_batching() || self.scheduler.is_flushing() {
            return;
        }
        if self.config().scheduler == SchedulerMode::Frame {
            return;
        }
        self.flush(FlushPolicy::Propagate);
    }

    /// Run queued effects until the pending set is empty.
    ///
    /// Returns the number of owners run. Re-entrant calls return `0` and
    /// leave the work to the flush already in progress.
    pub(crate) fn flush(&self, policy: FlushPolicy) -> usize {
        if self.scheduler.flushing.replace(true) {
            return 0;
        }
        let _flushing = FlushingGuard(&self.scheduler);
        let limit = self.config().max_updates_per_flush;
        let mut runs = 0;

        while let Some(owner) = self.scheduler.next() {
            if !self.owner_exists(owner) {
                continue;
            }
            if runs == limit {
                let dropped = self.scheduler.pending_count() + 1;
                self.scheduler.pending.borrow_mut().clear();
                tracing::error!(
                    limit,
                    dropped,
                    "flush exceeded its update limit; an effect is likely re-triggering itself"
                );
                break;
            }
            runs += 1;

            match policy {
                FlushPolicy::Propagate => self.run_effect(owner),
                FlushPolicy::Isolate => {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_effect(owner)));
                    if let Err(payload) = result {
                        tracing::error!(
                            owner = ?owner,
                            error = panic_message(payload.as_ref()),
                            "effect panicked during batched flush"
                        );
                    }
                }
            }
        }

        tracing::trace!(runs, "flush complete");
        runs
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Run `f` as one transaction: effects notified by writes inside `f` run
/// at most once each, after the outermost `batch` returns.
///
/// If `f` panics, the batch is still closed and flushed before the panic
/// resumes, so writes made before the panic reach their subscribers.
///
/// ```rust,ignore
/// batch(|| {
///     first.set("Ada".into());
///     last.set("Lovelace".into());
/// }); // an effect reading both runs once here
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    with_runtime(|rt| rt.scheduler.start());
    let result = panic::catch_unwind(AssertUnwindSafe(f));

    with_runtime(|rt| {
        if rt.scheduler.end() && rt.config().scheduler == SchedulerMode::Immediate {
            rt.flush(FlushPolicy::Isolate);
        }
    });

    match result {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Check whether a [`batch`] is open on this thread.
pub fn is_batching() -> bool {
    with_runtime(|rt| rt.scheduler.is_batching())
}

/// Run every queued effect now. Returns how many ran.
///
/// Under [`SchedulerMode::Frame`] this is how the host applies the work
/// coalesced since the last frame. Under the immediate scheduler the queue
/// is normally empty and this returns `0`. Panicking effects are isolated
/// and logged. Calling it inside a batch does nothing; the batch flushes
/// when it closes.
pub fn flush() -> usize {
    with_runtime(|rt| {
        if rt.scheduler.is_batching() {
            return 0;
        }
        rt.flush(FlushPolicy::Isolate)
    })
}

/// Number of effects waiting for the next flush.
pub fn pending_effects() -> usize {
    with_runtime(|rt| rt.scheduler.pending_count())
}
