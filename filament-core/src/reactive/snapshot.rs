//! Signal snapshots.
//!
//! A serializable signal registers itself in the runtime's snapshot table
//! under its [`SignalId`]. [`dump`] captures every live registered signal
//! into a [`Snapshot`]; [`restore`] writes a snapshot back.
//!
//! Restoring is order-tolerant. Values for signals that exist are applied
//! at once (in one batch); values for ids nobody has claimed yet are kept
//! pending, and a serializable signal created later with that id starts
//! from the restored value instead of its initial one. This is how a client
//! boots from state captured elsewhere before building its graph.
//!
//! ```rust,ignore
//! let bytes = snapshot::dump()?.to_msgpack()?;
//! // ... elsewhere, before creating signals
//! snapshot::restore(&Snapshot::from_msgpack(&bytes)?)?;
//! ```

use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::batch::batch;
use super::runtime::with_runtime;
use super::signal::{Signal, SignalInner};
use super::subscriber::SignalId;
use crate::error::{ReactiveError, Result};

/// Serialized values of a set of signals, keyed by signal id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    values: BTreeMap<SignalId, Value>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the serialized value for `id`.
    pub fn get(&self, id: SignalId) -> Option<&Value> {
        self.values.get(&id)
    }

    /// Set the serialized value for `id`.
    pub fn insert(&mut self, id: SignalId, value: Value) -> Option<Value> {
        self.values.insert(id, value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &Value)> {
        self.values.iter().map(|(id, value)| (*id, value))
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as MessagePack.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decode from MessagePack.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// A registered signal, type-erased.
pub(crate) trait SnapshotEntry {
    fn is_live(&self) -> bool;

    /// The signal's current value, or `None` if it has been dropped.
    fn dump(&self) -> Option<Result<Value>>;

    /// Write `value` into the signal. Returns `false` if it has been dropped.
    fn restore(&self, value: Value) -> Result<bool>;
}

struct SignalEntry<T> {
    id: SignalId,
    signal: Weak<SignalInner<T>>,
}

impl<T> SnapshotEntry for SignalEntry<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn is_live(&self) -> bool {
        self.signal.strong_count() > 0
    }

    fn dump(&self) -> Option<Result<Value>> {
        let inner = self.signal.upgrade()?;
        let value = serde_json::to_value(&*inner.value.borrow());
        Some(value.map_err(|source| ReactiveError::Serialize {
            id: self.id.raw(),
            source,
        }))
    }

    fn restore(&self, value: Value) -> Result<bool> {
        let Some(inner) = self.signal.upgrade() else {
            return Ok(false);
        };
        let value: T = serde_json::from_value(value).map_err(|source| ReactiveError::Restore {
            id: self.id.raw(),
            source,
        })?;
        Signal { inner }.set(value);
        Ok(true)
    }
}

/// Registered signals and restored values waiting for their signal.
#[derive(Default)]
pub(crate) struct SnapshotTable {
    entries: BTreeMap<SignalId, Rc<dyn SnapshotEntry>>,
    pending: BTreeMap<SignalId, Value>,
}

impl SnapshotTable {
    /// Drop the entry of a signal that is going away.
    pub(crate) fn forget(&mut self, id: SignalId) {
        self.entries.remove(&id);
    }

    /// Take the pending value for `id`. Ids are handed out in increasing
    /// order, so pending values for lower ids can no longer be claimed and
    /// are dropped as well.
    fn claim(&mut self, id: SignalId) -> Option<Value> {
        let claimed = self.pending.remove(&id);
        self.pending.retain(|pending, _| *pending > id);
        claimed
    }

    fn prune(&mut self) {
        self.entries.retain(|_, entry| entry.is_live());
    }

    fn live_entries(&mut self) -> Vec<(SignalId, Rc<dyn SnapshotEntry>)> {
        self.prune();
        self.entries
            .iter()
            .map(|(id, entry)| (*id, Rc::clone(entry)))
            .collect()
    }
}

impl<T> Signal<T>
where
    T: PartialEq + Serialize + DeserializeOwned + 'static,
{
    /// Create a signal that takes part in [`dump`] and [`restore`].
    ///
    /// If a restored value is pending for this signal's id, the signal
    /// starts with it and `value` is discarded. A pending value of the
    /// wrong type is logged and ignored.
    pub fn serializable(value: T) -> Self {
        let signal = Signal::new(value);
        let id = signal.id();

        let pending = with_runtime(|rt| rt.snapshots.borrow_mut().claim(id));
        if let Some(raw) = pending {
            match serde_json::from_value::<T>(raw) {
                Ok(restored) => {
                    // Nothing can have subscribed yet; no notification needed.
                    signal.inner.value.replace(restored);
                    tracing::debug!(%id, "signal started from restored snapshot value");
                }
                Err(error) => {
                    tracing::warn!(%id, %error, "discarding restored value of the wrong type");
                }
            }
        }

        let entry: Rc<dyn SnapshotEntry> = Rc::new(SignalEntry {
            id,
            signal: Rc::downgrade(&signal.inner),
        });
        with_runtime(|rt| rt.snapshots.borrow_mut().entries.insert(id, entry));
        signal
    }
}

/// Capture the value of every live serializable signal on this thread.
pub fn dump() -> Result<Snapshot> {
    let entries = with_runtime(|rt| rt.snapshots.borrow_mut().live_entries());

    let mut snapshot = Snapshot::new();
    for (id, entry) in entries {
        if let Some(value) = entry.dump() {
            snapshot.insert(id, value?);
        }
    }
    tracing::debug!(signals = snapshot.len(), "dumped snapshot");
    Ok(snapshot)
}

/// Apply `snapshot` to this thread's serializable signals.
///
/// Live signals are written inside one [`batch`], so their dependents
/// re-run once. Ids not handed out yet are kept pending for signals
/// created later; ids that belong to dropped or plain signals are skipped. Returns the number of signals written.
///
/// On a type mismatch the error is returned; values applied before it stay
/// applied.
pub fn restore(snapshot: &Snapshot) -> Result<usize> {
    let (targets, pending) = with_runtime(|rt| {
        let next_id = rt.peek_signal_id();
        let mut guard = rt.snapshots.borrow_mut();
        let table = &mut *guard;
        table.prune();

        let mut targets: Vec<(Rc<dyn SnapshotEntry>, Value)> = Vec::new();
        let mut pending = 0;
        for (id, value) in snapshot.iter() {
            match table.entries.get(&id) {
                Some(entry) => targets.push((Rc::clone(entry), value.clone())),
                None if id >= next_id => {
                    table.pending.insert(id, value.clone());
                    pending += 1;
                }
                None => tracing::debug!(%id, "no serializable signal with this id; skipping"),
            }
        }
        (targets, pending)
    });

    let applied = batch(|| -> Result<usize> {
        let mut applied = 0;
        for (entry, value) in targets {
            if entry.restore(value)? {
                applied += 1;
            }
        }
        Ok(applied)
    })?;

    tracing::debug!(applied, pending, "restored snapshot");
    Ok(applied)
}

/// Number of restored values still waiting for their signal.
pub fn pending_restores() -> usize {
    with_runtime(|rt| rt.snapshots.borrow().pending.len())
}
