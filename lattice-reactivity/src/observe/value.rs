//! Values stored in observed containers.

use std::fmt;
use std::rc::Rc;

use super::handle::Reactive;
use super::store::Raw;

/// A key of a map container or a member of a set container.
///
/// Containers are keyed by identity, through their raw handle, so a wrapped
/// and an unwrapped reference to the same container are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Object(Raw),
}

impl MapKey {
    /// Convert a value into a key, if it has a key form.
    ///
    /// Non-integral numbers have none.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Null => Some(MapKey::Null),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Some(MapKey::Int(*n as i64)),
            Value::Number(_) => None,
            Value::Str(s) => Some(MapKey::Str(Rc::clone(s))),
            Value::Raw(raw) => Some(MapKey::Object(*raw)),
            Value::Handle(handle) => Some(MapKey::Object(handle.raw())),
        }
    }

    /// The key as a value.
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Null => Value::Null,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Number(*i as f64),
            MapKey::Str(s) => Value::Str(Rc::clone(s)),
            MapKey::Object(raw) => Value::Raw(*raw),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(Rc::from(s))
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::Str(Rc::from(s))
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

impl From<i32> for MapKey {
    fn from(i: i32) -> Self {
        MapKey::Int(i64::from(i))
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<Raw> for MapKey {
    fn from(raw: Raw) -> Self {
        MapKey::Object(raw)
    }
}

impl From<&Reactive> for MapKey {
    fn from(handle: &Reactive) -> Self {
        MapKey::Object(handle.raw())
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Null => f.write_str("null"),
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Str(s) => write!(f, "{s:?}"),
            MapKey::Object(raw) => write!(f, "{raw}"),
        }
    }
}

/// A value held in a container slot.
///
/// Equality is same-value-zero: `NaN` equals `NaN`, `0.0` equals `-0.0`, and
/// containers compare by identity with a handle equal to its raw container.
/// [`Value::strict_equals`] tells a handle and its raw container apart.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// An unwrapped container.
    Raw(Raw),
    /// A wrapped container.
    Handle(Reactive),
}

impl Value {
    /// Same-value-zero comparison, used for change detection.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.as_raw(), other.as_raw()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Identity comparison for searches: `NaN` never matches, and a handle
    /// only matches the same handle.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a == b,
            (Value::Raw(_), Value::Handle(_)) | (Value::Handle(_), Value::Raw(_)) => false,
            _ => self.same_value_zero(other),
        }
    }

    /// Replace a wrapped container with its raw container.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Handle(handle) => Value::Raw(handle.raw()),
            other => other.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value refers to a container, wrapped or not.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Raw(_) | Value::Handle(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Reactive> {
        match self {
            Value::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// The raw container behind the value, wrapped or not.
    pub fn as_raw(&self) -> Option<Raw> {
        match self {
            Value::Raw(raw) => Some(*raw),
            Value::Handle(handle) => Some(handle.raw()),
            _ => None,
        }
    }

    /// The value as a sequence index or length.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= usize::MAX as f64 => Some(*n as usize),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value_zero(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Raw(raw) => write!(f, "{raw}"),
            Value::Handle(handle) => write!(f, "{}({})", handle.mode(), handle.raw()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Raw> for Value {
    fn from(raw: Raw) -> Self {
        Value::Raw(raw)
    }
}

impl From<Reactive> for Value {
    fn from(handle: Reactive) -> Self {
        Value::Handle(handle)
    }
}

impl From<&Reactive> for Value {
    fn from(handle: &Reactive) -> Self {
        Value::Handle(handle.clone())
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        key.to_value()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{reactive, readonly};

    #[test]
    fn nan_equals_nan_for_change_detection() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_ne!(Value::from(f64::NAN), Value::from(1.0));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert!(!Value::from(f64::NAN).strict_equals(&Value::from(f64::NAN)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Raw::record();
        let b = Raw::record();

        assert_eq!(Value::from(a), Value::from(a));
        assert_ne!(Value::from(a), Value::from(b));
        assert_eq!(Value::from(reactive(a)), Value::from(a));
        assert_eq!(Value::from(readonly(a)), Value::from(reactive(a)));
        assert!(!Value::from(reactive(a)).strict_equals(&Value::from(a)));
    }

    #[test]
    fn scalars_do_not_cross_types() {
        assert_ne!(Value::from(1), Value::from("1"));
        assert_ne!(Value::from(false), Value::Null);
    }

    #[test]
    fn index_conversion() {
        assert_eq!(Value::from(3).as_index(), Some(3));
        assert_eq!(Value::from(-1).as_index(), None);
        assert_eq!(Value::from(1.5).as_index(), None);
        assert_eq!(Value::from("3").as_index(), None);
    }

    #[test]
    fn map_keys_round_trip_through_values() {
        let raw = Raw::map();
        assert_eq!(MapKey::from_value(&Value::from(2)), Some(MapKey::Int(2)));
        assert_eq!(MapKey::from_value(&Value::from(2.5)), None);
        assert_eq!(MapKey::from_value(&Value::from(reactive(raw))), Some(MapKey::Object(raw)));
        assert_eq!(MapKey::from("k").to_value(), Value::from("k"));
    }
}
