//! Reconciliation
//!
//! Pure, stateless diffing used wherever a collection must be turned into
//! add/remove/move/update operations.
//!
//! - `array`: keyed diff of two slices into an edit script
//! - `value`: structural reconcile of immutable state trees that keeps
//!   unchanged sub-trees by reference
//!
//! Neither part touches the reactive runtime. They pair with it through
//! `Signal::update`: a signal holding a [`Value`] updated with
//! [`reconcile`] only notifies when something really changed.

mod array;
mod value;

pub use array::{
    reconcile_array, reconcile_array_by_index, reconcile_array_with, OpKind, ReconcileOp,
    Reconciliation,
};
pub use value::{reconcile, reconcile_value, ReconcileOptions, Value};
