//! Structural reconciliation of immutable state trees.
//!
//! [`Value`] is a JSON-shaped tree whose strings, arrays and objects sit
//! behind `Rc`. Reconciling a freshly produced tree against the previous
//! one returns a tree that reuses the previous allocation for every
//! sub-tree that did not change, so consumers comparing by pointer
//! (`Value::ptr_eq`) only see the parts that actually changed.
//!
//! Arrays are matched item by item with the keyed array diff: records that
//! carry the configured key field are matched by key, everything else by
//! position.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::array::{diff, OpKind};

/// An immutable JSON-shaped value with shared sub-trees.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<IndexMap<String, Value>>),
}

impl Value {
    /// Pointer identity for shared variants, value equality for scalars.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => false,
        }
    }

    /// Look up a field of an object.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(field),
            _ => None,
        }
    }

    /// Look up an element of an array.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(items) => items.get(index),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Convert into a plain `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Compared as maps: field order is not part of the value.
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(Rc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(fields) => Value::Object(Rc::new(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Options for [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Field that identifies array items that are objects. `None` matches
    /// every array item by position.
    pub key: Option<String>,

    /// Reconcile array items without a key field by position, keeping
    /// their unchanged sub-trees. When off, such an item is reused only if
    /// it is equal as a whole, and replaced otherwise.
    pub merge: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            key: Some("id".to_owned()),
            merge: false,
        }
    }
}

impl ReconcileOptions {
    /// Match array records by `field`.
    pub fn keyed_by(field: impl Into<String>) -> Self {
        Self {
            key: Some(field.into()),
            ..Self::default()
        }
    }

    /// Match every array item by position.
    pub fn by_position() -> Self {
        Self {
            key: None,
            ..Self::default()
        }
    }

    pub fn merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }
}

/// Build an updater that reconciles `next` into whatever value it is given.
///
/// Meant to be handed to a signal's `update`:
///
/// ```rust,ignore
/// let update = reconcile(fetched, ReconcileOptions::default());
/// state.update(update);
/// ```
pub fn reconcile(next: Value, options: ReconcileOptions) -> impl FnOnce(&Value) -> Value {
    move |prev| reconcile_value(prev, next, &options)
}

/// Reconcile `next` against `prev`, reusing `prev`'s allocations for every
/// unchanged sub-tree. The result is equal to `next`.
pub fn reconcile_value(prev: &Value, next: Value, options: &ReconcileOptions) -> Value {
    match (prev, next) {
        (Value::Object(old), Value::Object(new)) => reconcile_object(prev, old, &new, options),
        (Value::Array(old), Value::Array(new)) => reconcile_items(prev, old, &new, options),
        (_, next) if *prev == next => prev.clone(),
        (_, next) => next,
    }
}

fn reconcile_object(
    prev: &Value,
    old: &IndexMap<String, Value>,
    new: &IndexMap<String, Value>,
    options: &ReconcileOptions,
) -> Value {
    // A pure reordering of the same fields keeps the previous object.
    let mut changed = old.len() != new.len();
    let mut fields = IndexMap::with_capacity(new.len());

    for (field, next) in new {
        let value = match old.get(field) {
            Some(previous) => {
                let value = reconcile_value(previous, next.clone(), options);
                changed |= !value.ptr_eq(previous);
                value
            }
            None => {
                changed = true;
                next.clone()
            }
        };
        fields.insert(field.clone(), value);
    }

    if changed {
        Value::Object(Rc::new(fields))
    } else {
        prev.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ItemKey {
    Field(String),
    Position(usize),
}

fn item_key(item: &Value, index: usize, options: &ReconcileOptions) -> ItemKey {
    let field = options
        .key
        .as_deref()
        .and_then(|field| item.get(field))
        .filter(|value| !value.is_null());
    match field {
        Some(value) => ItemKey::Field(value.to_json().to_string()),
        None => ItemKey::Position(index),
    }
}

fn reconcile_items(
    prev: &Value,
    old: &[Value],
    new: &[Value],
    options: &ReconcileOptions,
) -> Value {
    let old_keys: Vec<ItemKey> = old
        .iter()
        .enumerate()
        .map(|(i, item)| item_key(item, i, options))
        .collect();
    let new_keys: Vec<ItemKey> = new
        .iter()
        .enumerate()
        .map(|(i, item)| item_key(item, i, options))
        .collect();
    let script = diff(old, old_keys, new, new_keys, Value::eq);

    let mut matched: Vec<Option<(OpKind, usize)>> = vec![None; new.len()];
    for op in &script.ops {
        if let (Some(old_index), Some(new_index)) = (op.old_index, op.new_index) {
            matched[new_index] = Some((op.kind, old_index));
        }
    }

    let mut changed = old.len() != new.len();
    let mut items = Vec::with_capacity(new.len());
    for (index, next) in new.iter().enumerate() {
        let item = match matched[index] {
            Some((OpKind::Keep, old_index)) => old[old_index].clone(),
            Some((_, old_index)) => {
                let previous = &old[old_index];
                let keyed = matches!(item_key(next, index, options), ItemKey::Field(_));
                if keyed || options.merge {
                    reconcile_value(previous, next.clone(), options)
                } else {
                    next.clone()
                }
            }
            None => next.clone(),
        };
        changed |= old.get(index).map_or(true, |previous| !item.ptr_eq(previous));
        items.push(item);
    }

    if changed {
        Value::Array(Rc::new(items))
    } else {
        prev.clone()
    }
}
