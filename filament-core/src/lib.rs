//! Filament Core
//!
//! This crate provides the core runtime for the Filament reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - An ownership tree that tears down nested computations
//! - A batch scheduler with immediate and frame-coalesced modes
//! - Keyed array and structural state reconciliation
//! - Snapshots of signal state for transport between processes
//!
//! Everything runs synchronously on the calling thread. Each thread owns an
//! independent reactive runtime.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, dependency tracking and scheduling
//! - `reconcile`: Edit scripts for lists and reference-preserving tree merges
//! - `config`: Per-thread runtime settings
//! - `error`: Errors of the fallible (serialization) paths
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::reactive::{batch, Effect, Memo, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Memo::new(move || c.get() * 2);
//!
//! // Create an effect
//! let (c, d) = (count.clone(), doubled.clone());
//! Effect::new(move || {
//!     println!("Count: {}, Doubled: {}", c.get(), d.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! // Several writes, one re-run
//! batch(|| {
//!     count.set(6);
//!     count.set(7);
//! });
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod reconcile;

pub use config::{configure, runtime_config, RuntimeConfig, SchedulerMode};
pub use error::{ReactiveError, Result};
pub use reactive::{batch, flush, is_batching, Effect, Memo, Signal};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
