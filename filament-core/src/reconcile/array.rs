//! Keyed array diffing.
//!
//! Given an old and a new list plus a key for every item, produce the edit
//! script that turns one into the other:
//!
//! - every old key missing from the new list emits `Remove` (old order),
//! - then every new item, in new order, emits `Add`, `Move`, `Update` or
//!   `Keep`.
//!
//! Removes always come first so a consumer applying the script can delete
//! before it inserts without index aliasing.
//!
//! When a key occurs more than once in a list, its last occurrence is the
//! one that counts; earlier occurrences emit nothing.

use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

/// Kind of an edit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// The key exists only in the old list.
    Remove,
    /// The key exists only in the new list.
    Add,
    /// The key exists in both lists at different indices.
    Move,
    /// Same key, same index, different item.
    Update,
    /// Same key, same index, same item.
    Keep,
}

/// One edit operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOp<'a, T, K> {
    pub kind: OpKind,
    pub key: K,
    /// The old item for `Remove`, the new item otherwise.
    pub item: &'a T,
    /// Index in the old list. `None` for `Add`.
    pub old_index: Option<usize>,
    /// Index in the new list. `None` for `Remove`.
    pub new_index: Option<usize>,
}

/// Result of diffing two lists.
#[derive(Debug, Clone)]
pub struct Reconciliation<'a, T, K> {
    /// The edit script: removes first, then new-list order.
    pub ops: Vec<ReconcileOp<'a, T, K>>,
    /// Keys to remove, in old-list order.
    pub to_remove: IndexSet<K>,
    /// Keys to add, in new-list order.
    pub to_add: IndexSet<K>,
    /// Moved keys mapped to `(old_index, new_index)`, in new-list order.
    pub moved: IndexMap<K, (usize, usize)>,
}

impl<T, K> Reconciliation<'_, T, K> {
    /// Number of operations of `kind`.
    pub fn count(&self, kind: OpKind) -> usize {
        self.ops.iter().filter(|op| op.kind == kind).count()
    }

    /// True when the two lists were identical.
    pub fn is_unchanged(&self) -> bool {
        self.ops.iter().all(|op| op.kind == OpKind::Keep)
    }
}

/// Diff `old` against `new`, keying items with `key` and comparing them
/// with `PartialEq`.
///
/// ```rust,ignore
/// let ops = reconcile_array(&old_rows, &new_rows, |row| row.id);
/// for id in &ops.to_remove { view.remove(id); }
/// ```
pub fn reconcile_array<'a, T, K>(
    old: &'a [T],
    new: &'a [T],
    key: impl Fn(&T) -> K,
) -> Reconciliation<'a, T, K>
where
    T: PartialEq,
    K: Hash + Eq + Clone,
{
    reconcile_array_with(old, new, key, T::eq)
}

/// Like [`reconcile_array`], with a custom notion of "same item" used to
/// pick between `Keep` and `Update` (e.g. `Rc::ptr_eq` for identity).
pub fn reconcile_array_with<'a, T, K>(
    old: &'a [T],
    new: &'a [T],
    key: impl Fn(&T) -> K,
    same: impl Fn(&T, &T) -> bool,
) -> Reconciliation<'a, T, K>
where
    K: Hash + Eq + Clone,
{
    let old_keys: Vec<K> = old.iter().map(&key).collect();
    let new_keys: Vec<K> = new.iter().map(&key).collect();
    diff(old, old_keys, new, new_keys, same)
}

/// Diff by position: item `i` of `old` is matched with item `i` of `new`.
///
/// Produces only `Keep`, `Update`, trailing `Add`s and trailing `Remove`s.
pub fn reconcile_array_by_index<'a, T>(old: &'a [T], new: &'a [T]) -> Reconciliation<'a, T, usize>
where
    T: PartialEq,
{
    diff(old, (0..old.len()).collect(), new, (0..new.len()).collect(), T::eq)
}

/// Index of each key's authoritative (last) occurrence.
fn index_keys<K: Hash + Eq + Clone>(keys: &[K]) -> IndexMap<K, usize> {
    let mut lookup = IndexMap::with_capacity(keys.len());
    for (index, key) in keys.iter().enumerate() {
        lookup.insert(key.clone(), index);
    }
    lookup
}

pub(crate) fn diff<'a, T, K>(
    old: &'a [T],
    old_keys: Vec<K>,
    new: &'a [T],
    new_keys: Vec<K>,
    same: impl Fn(&T, &T) -> bool,
) -> Reconciliation<'a, T, K>
where
    K: Hash + Eq + Clone,
{
    let old_lookup = index_keys(&old_keys);
    let new_lookup = index_keys(&new_keys);

    let mut result = Reconciliation {
        ops: Vec::with_capacity(new.len()),
        to_remove: IndexSet::new(),
        to_add: IndexSet::new(),
        moved: IndexMap::new(),
    };

    for (old_index, key) in old_keys.into_iter().enumerate() {
        if old_lookup[&key] != old_index || new_lookup.contains_key(&key) {
            continue;
        }
        result.to_remove.insert(key.clone());
        result.ops.push(ReconcileOp {
            kind: OpKind::Remove,
            key,
            item: &old[old_index],
            old_index: Some(old_index),
            new_index: None,
        });
    }

    for (new_index, key) in new_keys.into_iter().enumerate() {
        if new_lookup[&key] != new_index {
            continue;
        }
        let item = &new[new_index];
        let old_index = old_lookup.get(&key).copied();

        let kind = match old_index {
            None => {
                result.to_add.insert(key.clone());
                OpKind::Add
            }
            Some(old_index) if old_index != new_index => {
                result.moved.insert(key.clone(), (old_index, new_index));
                OpKind::Move
            }
            Some(old_index) if same(&old[old_index], item) => OpKind::Keep,
            Some(_) => OpKind::Update,
        };

        result.ops.push(ReconcileOp {
            kind,
            key,
            item,
            old_index,
            new_index: Some(new_index),
        });
    }

    tracing::trace!(
        old = old.len(),
        new = new.len(),
        ops = result.ops.len(),
        "reconciled array"
    );
    result
}
