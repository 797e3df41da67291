//! The dynamic value tree (spec §3, §4.1).
//!
//! A [`Value`] is a tagged union of null, bool, signed 64-bit integer, 64-bit
//! float, string, array, or map. Arrays preserve insertion order and permit
//! duplicates; maps preserve insertion order and forbid duplicate keys on
//! strict insertion (used by the INI parser) while allowing overwrite through
//! [`Value::map_insert`] (used for normal mutation and `extend`).
//!
//! Values are reference-counted with [`Rc`]: the core is single-threaded and
//! cooperative (spec §5), so there is no need to pay for atomic refcounts the
//! way the teacher's `Arc<dyn Data>` does for its `rayon`-scoped pipeline.

use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;
use thiserror::Error;

/// The kind of a [`Value`], returned by [`Value::get_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Map,
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Map => "map",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("value is frozen")]
    Frozen,
    #[error("expected a value of type {expected}, got {actual}")]
    WrongType {
        expected: ValueType,
        actual: ValueType,
    },
    #[error("duplicate key {0:?}")]
    DuplicateKey(Rc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutability {
    Mutable,
    Frozen,
}

#[derive(Debug, Default)]
struct ArrayInner {
    items: Vec<Value>,
    mutability: Option<Mutability>,
}

#[derive(Debug, Default)]
struct MapInner {
    // insertion-ordered key/value pairs; lookups are linear, which is fine
    // for the small parameter/config maps this tree is used for.
    entries: Vec<(Rc<str>, Value)>,
    mutability: Option<Mutability>,
}

impl MapInner {
    fn index_of(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| &**k == key)
    }
}

/// A dynamic, reference-counted, JSON-like value.
///
/// Cloning a `Value` is cheap (a refcount bump for containers, a copy for
/// scalars); it never deep-copies. Use [`Value::deep_copy`] for that.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Array(Rc<RefCell<ArrayInner>>),
    Map(Rc<RefCell<MapInner>>),
}

impl Value {
    pub fn null() -> Self {
        Value::Null
    }

    pub fn array() -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayInner::default())))
    }

    pub fn map() -> Self {
        Value::Map(Rc::new(RefCell::new(MapInner::default())))
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn get_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Map(_) => ValueType::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn mutability(&self) -> Option<Mutability> {
        match self {
            Value::Array(a) => a.borrow().mutability,
            Value::Map(m) => m.borrow().mutability,
            _ => None,
        }
    }

    /// True if this container (or any of its transitively shared aliases) has been frozen.
    pub fn is_frozen(&self) -> bool {
        matches!(self.mutability(), Some(Mutability::Frozen))
    }

    /// Deep-freeze this value tree. Scalars are immutable by construction and are
    /// no-ops here; containers are marked frozen and every mutator rejects with
    /// [`ValueError::Frozen`] from then on.
    pub fn freeze(&self) {
        match self {
            Value::Array(a) => {
                let mut inner = a.borrow_mut();
                inner.mutability = Some(Mutability::Frozen);
                let items: Vec<_> = inner.items.clone();
                drop(inner);
                for item in items {
                    item.freeze();
                }
            }
            Value::Map(m) => {
                let mut inner = m.borrow_mut();
                inner.mutability = Some(Mutability::Frozen);
                let entries: Vec<_> = inner.entries.iter().map(|(_, v)| v.clone()).collect();
                drop(inner);
                for v in entries {
                    v.freeze();
                }
            }
            _ => {}
        }
    }

    fn check_mutable(&self) -> Result<(), ValueError> {
        if self.is_frozen() {
            Err(ValueError::Frozen)
        } else {
            Ok(())
        }
    }

    /// Append to an array. Duplicates and any value kind are permitted.
    pub fn array_append(&self, value: Value) -> Result<(), ValueError> {
        let Value::Array(a) = self else {
            return Err(ValueError::WrongType {
                expected: ValueType::Array,
                actual: self.get_type(),
            });
        };
        self.check_mutable()?;
        a.borrow_mut().items.push(value);
        Ok(())
    }

    pub fn array_get(&self, index: usize) -> Option<Value> {
        let Value::Array(a) = self else { return None };
        a.borrow().items.get(index).cloned()
    }

    pub fn array_len(&self) -> Option<usize> {
        let Value::Array(a) = self else { return None };
        Some(a.borrow().items.len())
    }

    pub fn array_iter(&self) -> Option<Vec<Value>> {
        let Value::Array(a) = self else { return None };
        Some(a.borrow().items.clone())
    }

    /// Insert into a map, replacing any existing entry for `key` (spec §4.1:
    /// "Insertion into a map with an existing key replaces the entry for
    /// mutable maps").
    pub fn map_insert(&self, key: impl Into<Rc<str>>, value: Value) -> Result<(), ValueError> {
        let Value::Map(m) = self else {
            return Err(ValueError::WrongType {
                expected: ValueType::Map,
                actual: self.get_type(),
            });
        };
        self.check_mutable()?;
        let key = key.into();
        let mut inner = m.borrow_mut();
        if let Some(idx) = inner.index_of(&key) {
            inner.entries[idx].1 = value;
        } else {
            inner.entries.push((key, value));
        }
        Ok(())
    }

    /// Insert into a map, rejecting the insertion if `key` is already present
    /// (used by the INI parser, which treats a repeated key as a *duplicate
    /// key* error rather than an overwrite).
    pub fn map_insert_strict(
        &self,
        key: impl Into<Rc<str>>,
        value: Value,
    ) -> Result<(), ValueError> {
        let Value::Map(m) = self else {
            return Err(ValueError::WrongType {
                expected: ValueType::Map,
                actual: self.get_type(),
            });
        };
        self.check_mutable()?;
        let key = key.into();
        let mut inner = m.borrow_mut();
        if inner.index_of(&key).is_some() {
            return Err(ValueError::DuplicateKey(key));
        }
        inner.entries.push((key, value));
        Ok(())
    }

    pub fn map_get(&self, key: &str) -> Option<Value> {
        let Value::Map(m) = self else { return None };
        let inner = m.borrow();
        inner.index_of(key).map(|i| inner.entries[i].1.clone())
    }

    pub fn map_contains(&self, key: &str) -> bool {
        let Value::Map(m) = self else { return false };
        m.borrow().index_of(key).is_some()
    }

    /// Iterate a map's entries in insertion order.
    pub fn map_iter(&self) -> Option<Vec<(Rc<str>, Value)>> {
        let Value::Map(m) = self else { return None };
        Some(m.borrow().entries.clone())
    }

    pub fn map_len(&self) -> Option<usize> {
        let Value::Map(m) = self else { return None };
        Some(m.borrow().entries.len())
    }

    /// Extend this map with entries from `other`, later (i.e. `other`'s)
    /// entries overriding earlier ones on key collision (spec §4.1: "map
    /// extend (later overrides earlier)").
    pub fn map_extend(&self, other: &Value) -> Result<(), ValueError> {
        let Some(entries) = other.map_iter() else {
            return Err(ValueError::WrongType {
                expected: ValueType::Map,
                actual: other.get_type(),
            });
        };
        for (k, v) in entries {
            self.map_insert(k, v)?;
        }
        Ok(())
    }

    /// Recursively copy this value tree into a brand-new, unfrozen tree.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) => Value::Float(*f),
            Value::String(s) => Value::String(s.clone()),
            Value::Array(a) => {
                let copy = Value::array();
                for item in &a.borrow().items {
                    copy.array_append(item.deep_copy()).expect("fresh array is mutable");
                }
                copy
            }
            Value::Map(m) => {
                let copy = Value::map();
                for (k, v) in &m.borrow().entries {
                    copy.map_insert(k.clone(), v.deep_copy())
                        .expect("fresh map is mutable");
                }
                copy
            }
        }
    }

    /// Structural equality: same kind and same contents, recursively. Two
    /// `Null`s always compare equal (spec §4.1: "the shared null sentinel
    /// compares equal to itself by identity" — structurally this degenerates
    /// to the normal `Null == Null` case since there is exactly one kind of
    /// null).
    pub fn equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.items.len() == b.items.len()
                    && a.items.iter().zip(&b.items).all(|(x, y)| x.equal(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.entries.len() == b.entries.len()
                    && a.entries.iter().all(|(k, v)| {
                        b.index_of(k)
                            .is_some_and(|i| v.equal(&b.entries[i].1))
                    })
            }
            _ => false,
        }
    }

    /// Convert to a [`serde_json::Value`] for debug dumps and the `bt2 query`
    /// command surface.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(a) => {
                serde_json::Value::Array(a.borrow().items.iter().map(Value::to_json).collect())
            }
            Value::Map(m) => serde_json::Value::Object(
                m.borrow()
                    .entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert from a [`serde_json::Value`], producing a fresh, unfrozen tree.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => {
                let out = Value::array();
                for item in items {
                    out.array_append(Value::from_json(item)).unwrap();
                }
                out
            }
            serde_json::Value::Object(map) => {
                let out = Value::map();
                for (k, v) in map {
                    out.map_insert(k.as_str(), Value::from_json(v)).unwrap();
                }
                out
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_copy_is_equal() {
        let v = Value::map();
        v.map_insert("a", Value::Int(1)).unwrap();
        let arr = Value::array();
        arr.array_append(Value::Bool(true)).unwrap();
        arr.array_append(Value::Null).unwrap();
        v.map_insert("b", arr).unwrap();

        let copy = v.deep_copy();
        assert!(copy.equal(&v));
    }

    #[test]
    fn map_insert_then_lookup_and_order() {
        let v = Value::map();
        v.map_insert("first", Value::Int(1)).unwrap();
        v.map_insert("second", Value::Int(2)).unwrap();
        assert_eq!(v.map_get("first").unwrap().as_int(), Some(1));
        let keys: Vec<_> = v
            .map_iter()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(keys, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn map_insert_replaces_for_mutable_maps() {
        let v = Value::map();
        v.map_insert("a", Value::Int(1)).unwrap();
        v.map_insert("a", Value::Int(2)).unwrap();
        assert_eq!(v.map_get("a").unwrap().as_int(), Some(2));
        assert_eq!(v.map_len(), Some(1));
    }

    #[test]
    fn strict_insert_rejects_duplicate_key() {
        let v = Value::map();
        v.map_insert_strict("a", Value::Int(1)).unwrap();
        assert_eq!(
            v.map_insert_strict("a", Value::Int(2)),
            Err(ValueError::DuplicateKey("a".into()))
        );
    }

    #[test]
    fn freeze_rejects_mutation() {
        let v = Value::map();
        v.map_insert("a", Value::Int(1)).unwrap();
        v.freeze();
        assert_eq!(v.map_insert("b", Value::Int(2)), Err(ValueError::Frozen));
    }

    #[test]
    fn freeze_is_deep() {
        let inner = Value::array();
        let outer = Value::map();
        outer.map_insert("items", inner.clone()).unwrap();
        outer.freeze();
        assert!(inner.is_frozen());
        assert_eq!(inner.array_append(Value::Null), Err(ValueError::Frozen));
    }

    #[test]
    fn map_extend_overrides_earlier() {
        let a = Value::map();
        a.map_insert("x", Value::Int(1)).unwrap();
        a.map_insert("y", Value::Int(1)).unwrap();
        let b = Value::map();
        b.map_insert("y", Value::Int(2)).unwrap();
        a.map_extend(&b).unwrap();
        assert_eq!(a.map_get("x").unwrap().as_int(), Some(1));
        assert_eq!(a.map_get("y").unwrap().as_int(), Some(2));
    }
}
