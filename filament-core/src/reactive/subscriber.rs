//! Handles into the reactive arenas.
//!
//! Owners (effects, memos, roots) and sources (signals, memos) live in
//! slab arenas owned by the thread's runtime. Everything outside the
//! runtime refers to them through these small copyable handles.
//!
//! A handle pairs a slab slot with a serial number. Slots are reused after
//! disposal; the serial is never reused, so a stale handle to a recycled
//! slot is detected instead of silently acting on the new occupant.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::runtime::with_runtime;

/// Identifier of an owner (effect, memo or root) in the owner arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId {
    pub(crate) slot: usize,
    pub(crate) serial: u64,
}

impl OwnerId {
    /// The serial number of this owner. Unique for the lifetime of the thread.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({}@{})", self.serial, self.slot)
    }
}

/// Identifier of a trackable source (a signal or a memo) in the source arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub(crate) slot: usize,
    pub(crate) serial: u64,
}

impl SourceId {
    /// The serial number of this source.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({}@{})", self.serial, self.slot)
    }
}

/// Stable identifier of a signal, used as the key of a [`Snapshot`].
///
/// Signal ids are handed out from a per-thread counter in creation order,
/// so a server and a client that create their signals in the same order
/// agree on them.
///
/// [`Snapshot`]: crate::reactive::Snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(pub(crate) u64);

impl SignalId {
    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SignalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A value an owner can depend on.
///
/// Signals and memos both expose a source node; an owner's dependency set
/// holds either kind through this one interface.
pub trait Reactive {
    /// The source node readers subscribe to.
    fn source_id(&self) -> SourceId;

    /// Subscribe the currently running owner, if any, without reading.
    fn track(&self) {
        let source = self.source_id();
        with_runtime(|rt| rt.track(source));
    }

    /// Number of owners currently subscribed.
    fn subscriber_count(&self) -> usize {
        let source = self.source_id();
        with_runtime(|rt| rt.subscriber_count(source))
    }
}
