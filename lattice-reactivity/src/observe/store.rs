//! Container Arena
//!
//! Plain containers live in a thread-local arena and are addressed by
//! [`Raw`], a copyable handle carrying the container's graph target. The
//! arena also caches the wrapped handles created for each container, one
//! per mode.
//!
//! Containers are never collected implicitly. [`Raw::release`] removes the
//! container, its cached handles and every dependency bucket it owns, after
//! which operations through any handle to it fail with
//! [`ReactiveError::Released`].
//!
//! Everything in this module is untracked: reading or writing through a
//! `Raw` neither subscribes nor notifies.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::error::{ReactiveError, Result};
use crate::graph::{Key, TargetId, TriggerOp};
use crate::reactive::Runtime;

use super::handle::{Mode, Reactive};
use super::value::{MapKey, Value};

/// The shape of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// String-keyed properties in insertion order.
    Record,
    /// Index-addressed values with a length.
    Sequence,
    /// [`MapKey`]-keyed entries in insertion order.
    Map,
    /// A set of [`MapKey`] members in insertion order.
    Set,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(kind_name(*self))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Container {
    Record(IndexMap<Rc<str>, Value>),
    Sequence(Vec<Value>),
    Map(IndexMap<MapKey, Value>),
    Set(IndexSet<MapKey>),
}

/// Outcome of a raw write, used to decide what to trigger.
#[derive(Debug)]
pub(crate) struct Write {
    pub(crate) old: Option<Value>,
    pub(crate) op: TriggerOp,
    pub(crate) new_len: Option<usize>,
}

impl Write {
    fn replacing(old: Option<Value>) -> Self {
        let op = if old.is_some() { TriggerOp::Set } else { TriggerOp::Add };
        Self { old, op, new_len: None }
    }
}

impl Container {
    fn empty(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Record => Container::Record(IndexMap::new()),
            ContainerKind::Sequence => Container::Sequence(Vec::new()),
            ContainerKind::Map => Container::Map(IndexMap::new()),
            ContainerKind::Set => Container::Set(IndexSet::new()),
        }
    }

    pub(crate) fn kind(&self) -> ContainerKind {
        match self {
            Container::Record(_) => ContainerKind::Record,
            Container::Sequence(_) => ContainerKind::Sequence,
            Container::Map(_) => ContainerKind::Map,
            Container::Set(_) => ContainerKind::Set,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Container::Record(props) => props.len(),
            Container::Sequence(items) => items.len(),
            Container::Map(entries) => entries.len(),
            Container::Set(members) => members.len(),
        }
    }

    fn invalid_key(&self, key: &Key) -> ReactiveError {
        ReactiveError::InvalidKey {
            kind: self.kind(),
            key: key.clone(),
        }
    }

    pub(crate) fn expect_kind(&self, expected: ContainerKind) -> Result<()> {
        if self.kind() == expected {
            return Ok(());
        }
        Err(ReactiveError::WrongKind {
            expected: kind_name(expected),
            found: self.kind(),
        })
    }

    /// The value at `key`, or `None` if the slot is empty.
    ///
    /// Set members read as themselves.
    pub(crate) fn read(&self, key: &Key) -> Result<Option<Value>> {
        match (self, key) {
            (Container::Record(props), Key::Prop(name)) => Ok(props.get(name).cloned()),
            (Container::Sequence(items), Key::Index(index)) => Ok(items.get(*index).cloned()),
            (Container::Sequence(items), Key::Length) => Ok(Some(Value::from(items.len()))),
            (Container::Map(entries), Key::Entry(entry)) => Ok(entries.get(entry).cloned()),
            (Container::Set(members), Key::Entry(member)) => {
                Ok(members.contains(member).then(|| member.to_value()))
            }
            _ => Err(self.invalid_key(key)),
        }
    }

    pub(crate) fn contains(&self, key: &Key) -> Result<bool> {
        match (self, key) {
            (Container::Record(props), Key::Prop(name)) => Ok(props.contains_key(name)),
            (Container::Sequence(items), Key::Index(index)) => Ok(*index < items.len()),
            (Container::Sequence(_), Key::Length) => Ok(true),
            (Container::Map(entries), Key::Entry(entry)) => Ok(entries.contains_key(entry)),
            (Container::Set(members), Key::Entry(member)) => Ok(members.contains(member)),
            _ => Err(self.invalid_key(key)),
        }
    }

    /// Store `value` at `key`.
    ///
    /// Writing past the end of a sequence pads the gap with nulls. Writing
    /// the length truncates or pads.
    pub(crate) fn write(&mut self, key: &Key, value: Value) -> Result<Write> {
        match (self, key) {
            (Container::Record(props), Key::Prop(name)) => {
                Ok(Write::replacing(props.insert(Rc::clone(name), value)))
            }
            (Container::Sequence(items), Key::Index(index)) => {
                let index = *index;
                if let Some(slot) = items.get_mut(index) {
                    return Ok(Write::replacing(Some(std::mem::replace(slot, value))));
                }
                items.resize(index, Value::Null);
                items.push(value);
                Ok(Write::replacing(None))
            }
            (Container::Sequence(items), Key::Length) => {
                let new_len = value
                    .as_index()
                    .ok_or_else(|| ReactiveError::InvalidLength(value.to_string()))?;
                let old_len = items.len();
                items.resize(new_len, Value::Null);
                Ok(Write {
                    old: Some(Value::from(old_len)),
                    op: TriggerOp::Set,
                    new_len: Some(new_len),
                })
            }
            (Container::Map(entries), Key::Entry(entry)) => {
                Ok(Write::replacing(entries.insert(entry.clone(), value)))
            }
            (container, key) => Err(container.invalid_key(key)),
        }
    }

    /// Remove the slot at `key`, returning what it held.
    ///
    /// Removing a sequence element leaves a null in its place.
    pub(crate) fn remove(&mut self, key: &Key) -> Result<Option<Value>> {
        match (self, key) {
            (Container::Record(props), Key::Prop(name)) => Ok(props.shift_remove(name)),
            (Container::Sequence(items), Key::Index(index)) => {
                Ok(items.get_mut(*index).map(std::mem::take))
            }
            (Container::Map(entries), Key::Entry(entry)) => Ok(entries.shift_remove(entry)),
            (Container::Set(members), Key::Entry(member)) => {
                Ok(members.shift_remove(member).then(|| member.to_value()))
            }
            (container, key) => Err(container.invalid_key(key)),
        }
    }

    /// Add a member to a set. Returns `false` if it was already present.
    pub(crate) fn insert_member(&mut self, member: MapKey) -> Result<bool> {
        match self {
            Container::Set(members) => Ok(members.insert(member)),
            other => Err(ReactiveError::WrongKind {
                expected: "set",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn sequence_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Container::Sequence(items) => Ok(items),
            other => Err(ReactiveError::WrongKind {
                expected: "sequence",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn keys(&self) -> Vec<Key> {
        match self {
            Container::Record(props) => props.keys().map(|name| Key::Prop(Rc::clone(name))).collect(),
            Container::Sequence(items) => (0..items.len()).map(Key::Index).collect(),
            Container::Map(entries) => entries.keys().cloned().map(Key::Entry).collect(),
            Container::Set(members) => members.iter().cloned().map(Key::Entry).collect(),
        }
    }

    pub(crate) fn values(&self) -> Vec<Value> {
        match self {
            Container::Record(props) => props.values().cloned().collect(),
            Container::Sequence(items) => items.clone(),
            Container::Map(entries) => entries.values().cloned().collect(),
            Container::Set(members) => members.iter().map(MapKey::to_value).collect(),
        }
    }

    /// Remove everything. Returns `false` if the container was already empty.
    pub(crate) fn clear(&mut self) -> bool {
        let had_items = self.len() > 0;
        match self {
            Container::Record(props) => props.clear(),
            Container::Sequence(items) => items.clear(),
            Container::Map(entries) => entries.clear(),
            Container::Set(members) => members.clear(),
        }
        had_items
    }
}

fn kind_name(kind: ContainerKind) -> &'static str {
    match kind {
        ContainerKind::Record => "record",
        ContainerKind::Sequence => "sequence",
        ContainerKind::Map => "map",
        ContainerKind::Set => "set",
    }
}

#[derive(Default)]
struct Arena {
    containers: HashMap<TargetId, Container>,
    handles: HashMap<(TargetId, Mode), Reactive>,
}

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
}

/// Run `f` against the container behind `raw`.
///
/// `f` must not trigger: subscribers re-entering the arena would find it
/// borrowed.
pub(crate) fn with_container<R>(raw: Raw, f: impl FnOnce(&Container) -> Result<R>) -> Result<R> {
    ARENA.with(|arena| {
        let arena = arena.borrow();
        let container = arena
            .containers
            .get(&raw.0)
            .ok_or(ReactiveError::Released(raw.0))?;
        f(container)
    })
}

/// Mutable counterpart of [`with_container`], with the same restriction.
pub(crate) fn with_container_mut<R>(raw: Raw, f: impl FnOnce(&mut Container) -> Result<R>) -> Result<R> {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let container = arena
            .containers
            .get_mut(&raw.0)
            .ok_or(ReactiveError::Released(raw.0))?;
        f(container)
    })
}

/// The cached handle for `raw` in `mode`, created on first use.
///
/// Released containers get a fresh, uncached handle whose operations fail.
pub(crate) fn cached_handle(raw: Raw, mode: Mode) -> Reactive {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        if !arena.containers.contains_key(&raw.0) {
            return Reactive::new(raw, mode);
        }
        arena
            .handles
            .entry((raw.0, mode))
            .or_insert_with(|| Reactive::new(raw, mode))
            .clone()
    })
}

/// A plain container in the arena.
///
/// `Raw` is `Copy`; it identifies the container and gives untracked access
/// to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Raw(TargetId);

impl Raw {
    fn alloc(container: Container) -> Raw {
        let id = TargetId::new();
        ARENA.with(|arena| arena.borrow_mut().containers.insert(id, container));
        Raw(id)
    }

    /// An empty container of the given kind.
    pub fn new(kind: ContainerKind) -> Raw {
        Raw::alloc(Container::empty(kind))
    }

    pub fn record() -> Raw {
        Raw::new(ContainerKind::Record)
    }

    /// A record holding `props` in iteration order.
    pub fn record_from<I, K, V>(props: I) -> Raw
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let props = props.into_iter().map(|(name, value)| (name.into(), value.into()));
        Raw::alloc(Container::Record(props.collect()))
    }

    pub fn sequence() -> Raw {
        Raw::new(ContainerKind::Sequence)
    }

    pub fn sequence_from<I, V>(items: I) -> Raw
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Raw::alloc(Container::Sequence(items.into_iter().map(Into::into).collect()))
    }

    pub fn map() -> Raw {
        Raw::new(ContainerKind::Map)
    }

    pub fn map_from<I, K, V>(entries: I) -> Raw
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<MapKey>,
        V: Into<Value>,
    {
        let entries = entries.into_iter().map(|(key, value)| (key.into(), value.into()));
        Raw::alloc(Container::Map(entries.collect()))
    }

    pub fn empty_set() -> Raw {
        Raw::new(ContainerKind::Set)
    }

    pub fn set_from<I, K>(members: I) -> Raw
    where
        I: IntoIterator<Item = K>,
        K: Into<MapKey>,
    {
        Raw::alloc(Container::Set(members.into_iter().map(Into::into).collect()))
    }

    /// The graph target of this container.
    pub fn id(&self) -> TargetId {
        self.0
    }

    /// Whether the container is still in the arena.
    pub fn is_alive(&self) -> bool {
        ARENA.with(|arena| arena.borrow().containers.contains_key(&self.0))
    }

    pub fn kind(&self) -> Result<ContainerKind> {
        with_container(*self, |container| Ok(container.kind()))
    }

    pub fn len(&self) -> Result<usize> {
        with_container(*self, |container| Ok(container.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read a slot without tracking. Empty slots read as null.
    pub fn get(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        with_container(*self, |container| Ok(container.read(&key)?.unwrap_or_default()))
    }

    pub fn has(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        with_container(*self, |container| container.contains(&key))
    }

    /// Write a slot without notifying anyone.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        with_container_mut(*self, |container| container.write(&key, value).map(drop))
    }

    pub fn keys(&self) -> Result<Vec<Key>> {
        with_container(*self, |container| Ok(container.keys()))
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        with_container(*self, |container| Ok(container.values()))
    }

    /// Remove the container, its cached handles and its dependency buckets.
    pub fn release(self) -> Result<()> {
        let removed = ARENA.with(|arena| {
            let mut arena = arena.borrow_mut();
            let removed = arena.containers.remove(&self.0);
            arena.handles.retain(|(id, _), _| *id != self.0);
            removed
        });
        if removed.is_none() {
            return Err(ReactiveError::Released(self.0));
        }

        let buckets = Runtime::release(self.0);
        tracing::debug!(target_id = %self.0, buckets, "container released");
        Ok(())
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
