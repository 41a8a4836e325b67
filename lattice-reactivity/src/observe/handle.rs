//! Wrapped Handles
//!
//! A [`Reactive`] handle is the tracked view of a container. Reads through
//! it subscribe the running computation, writes notify subscribers.
//!
//! # Modes
//!
//! | mode               | tracks reads | accepts writes | wraps children |
//! |--------------------|--------------|----------------|----------------|
//! | `Mutable`          | yes          | yes            | mutable        |
//! | `Shallow`          | yes          | yes            | no             |
//! | `Readonly`         | no           | no (warns)     | read-only      |
//! | `ShallowReadonly`  | no           | no (warns)     | no             |
//!
//! Children are wrapped lazily, when read, never when the parent is wrapped.
//!
//! # Identity
//!
//! Handles are cached per container and mode: wrapping the same container
//! twice in the same mode yields the same handle, and handles compare by
//! pointer.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::graph::{Key, TriggerOp};
use crate::reactive::Runtime;

use super::store::{cached_handle, with_container, with_container_mut, ContainerKind, Raw};
use super::value::Value;

/// How a handle treats reads, writes and nested containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Mutable,
    Shallow,
    Readonly,
    ShallowReadonly,
}

impl Mode {
    pub fn is_readonly(self) -> bool {
        matches!(self, Mode::Readonly | Mode::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, Mode::Shallow | Mode::ShallowReadonly)
    }

    /// The mode nested containers are wrapped in.
    fn child(self) -> Option<Mode> {
        match self {
            Mode::Mutable => Some(Mode::Mutable),
            Mode::Readonly => Some(Mode::Readonly),
            Mode::Shallow | Mode::ShallowReadonly => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Mutable => "reactive",
            Mode::Shallow => "shallow_reactive",
            Mode::Readonly => "readonly",
            Mode::ShallowReadonly => "shallow_readonly",
        })
    }
}

struct HandleInner {
    raw: Raw,
    mode: Mode,
}

/// A tracked view of a container.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<HandleInner>,
}

/// Anything that can be wrapped: a raw container or an existing handle.
#[derive(Debug, Clone)]
pub enum Target {
    Raw(Raw),
    Handle(Reactive),
}

impl From<Raw> for Target {
    fn from(raw: Raw) -> Self {
        Target::Raw(raw)
    }
}

impl From<Reactive> for Target {
    fn from(handle: Reactive) -> Self {
        Target::Handle(handle)
    }
}

impl From<&Reactive> for Target {
    fn from(handle: &Reactive) -> Self {
        Target::Handle(handle.clone())
    }
}

fn create(target: Target, mode: Mode) -> Reactive {
    match target {
        // Only a read-only view of a writable handle produces a new handle;
        // every other existing handle is returned as-is.
        Target::Handle(handle) if mode.is_readonly() && !handle.is_readonly() => cached_handle(handle.raw(), mode),
        Target::Handle(handle) => handle,
        Target::Raw(raw) => cached_handle(raw, mode),
    }
}

/// Wrap `target` in a deep, writable handle.
pub fn reactive(target: impl Into<Target>) -> Reactive {
    create(target.into(), Mode::Mutable)
}

/// Wrap `target` in a writable handle that leaves nested containers raw.
pub fn shallow_reactive(target: impl Into<Target>) -> Reactive {
    create(target.into(), Mode::Shallow)
}

/// Wrap `target` in a deep, read-only handle.
pub fn readonly(target: impl Into<Target>) -> Reactive {
    create(target.into(), Mode::Readonly)
}

/// Wrap `target` in a read-only handle that leaves nested containers raw.
pub fn shallow_readonly(target: impl Into<Target>) -> Reactive {
    create(target.into(), Mode::ShallowReadonly)
}

/// Whether `target` is a writable handle.
pub fn is_reactive(target: impl Into<Target>) -> bool {
    match target.into() {
        Target::Handle(handle) => handle.is_reactive(),
        Target::Raw(_) => false,
    }
}

pub fn is_readonly(target: impl Into<Target>) -> bool {
    match target.into() {
        Target::Handle(handle) => handle.is_readonly(),
        Target::Raw(_) => false,
    }
}

pub fn is_shallow(target: impl Into<Target>) -> bool {
    match target.into() {
        Target::Handle(handle) => handle.is_shallow(),
        Target::Raw(_) => false,
    }
}

/// The raw container behind `target`.
pub fn to_raw(target: impl Into<Target>) -> Raw {
    match target.into() {
        Target::Handle(handle) => handle.raw(),
        Target::Raw(raw) => raw,
    }
}

impl Reactive {
    pub(crate) fn new(raw: Raw, mode: Mode) -> Self {
        Self {
            inner: Rc::new(HandleInner { raw, mode }),
        }
    }

    /// The raw container. Never tracks.
    pub fn raw(&self) -> Raw {
        self.inner.raw
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn is_reactive(&self) -> bool {
        !self.inner.mode.is_readonly()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.mode.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.mode.is_shallow()
    }

    pub fn kind(&self) -> Result<ContainerKind> {
        self.raw().kind()
    }

    pub(crate) fn track(&self, key: Key) {
        if !self.is_readonly() {
            Runtime::track(self.raw().id(), key);
        }
    }

    pub(crate) fn trigger(&self, key: Key, op: TriggerOp, new_len: Option<usize>) {
        Runtime::trigger(self.raw().id(), key, op, new_len);
    }

    /// Log and swallow a mutation through a read-only handle.
    pub(crate) fn reject_write(&self, operation: &'static str, key: Option<&Key>) {
        match key {
            Some(key) => tracing::warn!(
                target_id = %self.raw().id(),
                %key,
                operation,
                "mutation through a read-only handle ignored"
            ),
            None => tracing::warn!(
                target_id = %self.raw().id(),
                operation,
                "mutation through a read-only handle ignored"
            ),
        }
    }

    /// Wrap a value read out of this handle's container in the child mode.
    pub(crate) fn wrap(&self, value: Value) -> Value {
        let Some(mode) = self.mode().child() else {
            return value;
        };
        match value {
            Value::Raw(raw) => Value::Handle(create(Target::Raw(raw), mode)),
            Value::Handle(handle) => Value::Handle(create(Target::Handle(handle), mode)),
            scalar => scalar,
        }
    }

    /// Read a slot, subscribing to it. Empty slots read as null.
    ///
    /// Containers come back wrapped unless the handle is shallow.
    pub fn get(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        let value = with_container(self.raw(), |container| container.read(&key))?;
        self.track(key);
        Ok(self.wrap(value.unwrap_or_default()))
    }

    /// Write a slot and notify subscribers if the value changed.
    ///
    /// Returns `Ok(true)` on success, including the ignored write through a
    /// read-only handle.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        if self.is_readonly() {
            self.reject_write("set", Some(&key));
            return Ok(true);
        }

        let mut value = value.into();
        let keeps_handle = matches!(&value, Value::Handle(handle) if handle.is_readonly());
        if !self.is_shallow() && !keeps_handle {
            value = value.to_raw();
        }

        let write = with_container_mut(self.raw(), |container| container.write(&key, value.clone()))?;
        match write.op {
            TriggerOp::Add => self.trigger(key, TriggerOp::Add, None),
            _ => {
                let changed = match (&key, &write.new_len) {
                    (Key::Length, Some(new_len)) => write.old.as_ref().and_then(Value::as_index) != Some(*new_len),
                    _ => !write.old.as_ref().is_some_and(|old| old.same_value_zero(&value)),
                };
                if changed {
                    self.trigger(key, TriggerOp::Set, write.new_len);
                }
            }
        }
        Ok(true)
    }

    /// Whether a slot exists, subscribing to it.
    pub fn has(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        let present = with_container(self.raw(), |container| container.contains(&key))?;
        self.track(key);
        Ok(present)
    }

    /// Remove a slot. Returns whether it existed.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        if self.is_readonly() {
            self.reject_write("delete", Some(&key));
            return Ok(true);
        }

        let removed = with_container_mut(self.raw(), |container| container.remove(&key))?;
        if removed.is_none() {
            return Ok(false);
        }
        self.trigger(key, TriggerOp::Delete, None);
        Ok(true)
    }

    /// The key this container's shape is tracked under.
    pub(crate) fn shape_key(kind: ContainerKind) -> Key {
        match kind {
            ContainerKind::Sequence => Key::Length,
            _ => Key::Iterate,
        }
    }

    /// Every key, subscribing to additions and removals.
    pub fn own_keys(&self) -> Result<Vec<Key>> {
        let (kind, keys) = with_container(self.raw(), |container| Ok((container.kind(), container.keys())))?;
        self.track(Self::shape_key(kind));
        Ok(keys)
    }

    /// Number of slots, subscribing to the container's shape.
    pub fn len(&self) -> Result<usize> {
        let (kind, len) = with_container(self.raw(), |container| Ok((container.kind(), container.len())))?;
        self.track(Self::shape_key(kind));
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Every value, wrapped, subscribing to the whole container.
    ///
    /// Sequences subscribe per index and to the length; other containers to
    /// their shape.
    pub fn values(&self) -> Result<Vec<Value>> {
        let (kind, values) = with_container(self.raw(), |container| Ok((container.kind(), container.values())))?;
        match kind {
            ContainerKind::Sequence => {
                self.track(Key::Length);
                for index in 0..values.len() {
                    self.track(Key::Index(index));
                }
            }
            _ => self.track(Key::Iterate),
        }
        Ok(values.into_iter().map(|value| self.wrap(value)).collect())
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("raw", &self.inner.raw)
            .field("mode", &self.inner.mode)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
