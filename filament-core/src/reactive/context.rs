//! Reactive Context
//!
//! The reactive context tracks which owner is currently running and whether
//! reads should be tracked. This enables automatic dependency tracking: when
//! a signal is read, the runtime asks the context for the current observer
//! and subscribes it.
//!
//! # Implementation
//!
//! We use a thread-local stack of entries. Running an owner pushes an entry
//! that both owns and observes; `run_in_scope` and `untrack` push entries
//! that own without observing. Every push returns a guard that pops on drop,
//! so the stack is restored even if the computation panics.
//!
//! Ownership and observation are split because a child created inside
//! `untrack` must still be torn down with its parent, while the reads it
//! performs must not subscribe anyone.

use std::cell::RefCell;

use super::subscriber::OwnerId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy)]
struct ContextEntry {
    /// The owner new effects and memos attach to.
    owner: Option<OwnerId>,
    /// Whether reads register `owner` as a subscriber.
    tracking: bool,
}

/// Guard that pops its context entry when dropped.
pub(crate) struct ReactiveContext {
    depth: usize,
}

impl ReactiveContext {
    /// Enter the context of a running owner: reads are tracked against it and
    /// owners created inside become its children.
    pub(crate) fn enter(owner: OwnerId) -> Self {
        Self::push(ContextEntry {
            owner: Some(owner),
            tracking: true,
        })
    }

    /// Enter an ownership scope without tracking.
    pub(crate) fn enter_scope(owner: Option<OwnerId>) -> Self {
        Self::push(ContextEntry {
            owner,
            tracking: false,
        })
    }

    /// Suspend tracking while keeping the current owner.
    pub(crate) fn untracked() -> Self {
        Self::enter_scope(Self::current_owner())
    }

    fn push(entry: ContextEntry) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(entry);
            stack.len()
        });
        Self { depth }
    }

    /// The owner that newly created owners attach to, if any.
    pub(crate) fn current_owner() -> Option<OwnerId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.owner))
    }

    /// The owner that reads are tracked against, if tracking is active.
    pub(crate) fn current_observer() -> Option<OwnerId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|entry| entry.tracking)
                .and_then(|entry| entry.owner)
        })
    }

    /// Check whether reads are currently tracked.
    pub(crate) fn is_tracking() -> bool {
        Self::current_observer().is_some()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // try_with: the stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext dropped out of order"
            );
            stack.truncate(self.depth.saturating_sub(1));
        });
    }
}
