//! Reactive Targets and Keys
//!
//! A *reactive location* is a `(target, key)` pair. Targets are anything that
//! owns dependency buckets: containers in the observation arena, computeds
//! and signals. Keys name a slot inside the target.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::observe::MapKey;

/// Unique identifier for a target in the dependency graph.
///
/// Containers, computeds and signals draw from the same counter, so their
/// buckets never collide in the target map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A slot inside a target that can be tracked and triggered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property of a record.
    Prop(Rc<str>),

    /// A position in a sequence.
    Index(usize),

    /// An entry of a map or a member of a set.
    Entry(MapKey),

    /// The length of a sequence.
    Length,

    /// Shape sentinel: the set of keys of the target changed.
    ///
    /// Enumeration and size reads subscribe here; additions and removals
    /// trigger it.
    Iterate,

    /// Key-set sentinel of a map: additions and removals trigger it, value
    /// changes do not.
    KeyIterate,

    /// The single slot of a computed or signal.
    Value,
}

impl Key {
    /// Sentinel keys describe the target as a whole and never address data.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Key::Iterate | Key::KeyIterate | Key::Value)
    }

    /// The sequence position this key addresses, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            _ => None,
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Prop(Rc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Prop(Rc::from(name))
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Key::Prop(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<MapKey> for Key {
    fn from(key: MapKey) -> Self {
        Key::Entry(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(name) => write!(f, "{name:?}"),
            Key::Index(index) => write!(f, "[{index}]"),
            Key::Entry(key) => write!(f, "entry({key})"),
            Key::Length => f.write_str("length"),
            Key::Iterate => f.write_str("<iterate>"),
            Key::KeyIterate => f.write_str("<key-iterate>"),
            Key::Value => f.write_str("value"),
        }
    }
}

/// The kind of mutation being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing slot changed value.
    Set,

    /// A new slot appeared.
    Add,

    /// A slot was removed.
    Delete,

    /// Every slot of the target was removed at once.
    Clear,
}
