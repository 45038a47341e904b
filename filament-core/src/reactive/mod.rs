//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects,
//! plus the ownership tree and batch scheduler that tie them together.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only once someone reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as updating a render target or logging.
//!
//! ## Owners
//!
//! Effects and memos created while another one runs are owned by it. Owners
//! form a tree; re-running or disposing a node tears down its whole subtree.
//!
//! ## Batches
//!
//! [`batch`] groups writes so that each dependent effect re-runs once, after
//! the outermost batch closes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! Graph state lives in a thread-local runtime (see `runtime.rs`), so
//! reactive handles are `!Send` and every graph belongs to one thread.

mod batch;
mod context;
mod effect;
mod memo;
mod owner;
mod runtime;
mod signal;
pub mod snapshot;
mod subscriber;

pub use batch::{batch, flush, is_batching, pending_effects};
pub use effect::{Cleanup, Effect, IntoCleanup};
pub use memo::{Memo, MemoState};
pub use owner::{
    create_root, get_current_owner, is_tracking, on_cleanup, run_in_scope, untrack, Owner,
};
pub use signal::{signal, ReadSignal, Signal, WriteSignal};
pub use snapshot::Snapshot;
pub use subscriber::{OwnerId, Reactive, SignalId, SourceId};

pub(crate) use runtime::with_runtime;
