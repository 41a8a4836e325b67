//! Signal Implementation
//!
//! A Signal is a standalone reactive location holding one value. It owns a
//! graph target with a single key, [`Key::Value`].
//!
//! # How Signals Work
//!
//! 1. Reading a signal inside a tracked computation subscribes that
//!    computation to the signal.
//!
//! 2. Writing a different value notifies every subscriber. Writing an equal
//!    value does nothing.
//!
//! [`PropRef`] is the signal-shaped view of one property of a reactive
//! container: reads and writes go through the handle, so they are tracked
//! and triggered like any other access.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::graph::{Key, TargetId, TriggerOp};
use crate::observe::{reactive, Reactive, Value};

use super::runtime::Runtime;

/// A reactive cell holding a value of type `T`.
///
/// Cloning shares the same cell. Dropping the last clone releases the
/// signal's subscriptions.
///
/// # Example
///
/// ```rust
/// use lattice_reactivity::reactive::{effect, signal};
///
/// let count = signal(0);
/// let seen = count.clone();
/// let _runner = effect(move || println!("count = {}", seen.get()));
///
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    target: TargetId,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::release(self.target);
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                target: TargetId::new(),
                value: RefCell::new(value),
            }),
        }
    }

    /// The graph target subscribers of this signal live under.
    pub fn target(&self) -> TargetId {
        self.inner.target
    }

    /// Get the current value.
    ///
    /// Inside a tracked computation this subscribes to the signal.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.target, Key::Value);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Run `f` on the current value, tracking the read.
    ///
    /// `f` sees a snapshot, so it may write this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.get();
        f(&value)
    }

    /// Store `value` and notify subscribers if it differs from the current
    /// one. Returns whether it changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value;
        }
        Runtime::trigger(self.inner.target, Key::Value, TriggerOp::Set, None);
        true
    }

    /// Derive the next value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.get_untracked());
        self.set(next)
    }

    /// Number of computations subscribed to this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.target, &Key::Value)
    }

    /// Drop every subscription to this signal.
    pub fn dispose(&self) {
        Runtime::release(self.inner.target);
    }
}

impl Signal<Value> {
    /// Store `value`, wrapping a raw container in a reactive handle first.
    pub fn set_deep(&self, value: impl Into<Value>) -> bool {
        self.set(to_reactive(value.into()))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("target", &self.inner.target)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Create a signal holding `value`.
pub fn signal<T: Clone + PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

/// Create a signal over a [`Value`] whose containers are held as reactive
/// handles, so reads through it track the container too.
///
/// Later writes keep the wrapping when they go through
/// [`Signal::set_deep`].
pub fn deep_signal(value: impl Into<Value>) -> Signal<Value> {
    Signal::new(to_reactive(value.into()))
}

fn to_reactive(value: Value) -> Value {
    match value {
        Value::Raw(raw) => Value::Handle(reactive(raw)),
        other => other,
    }
}

/// A reference to one property of a reactive container.
#[derive(Debug, Clone)]
pub struct PropRef {
    handle: Reactive,
    key: Key,
}

impl PropRef {
    /// Read the property through the handle.
    pub fn get(&self) -> Result<Value> {
        self.handle.get(self.key.clone())
    }

    /// Write the property through the handle.
    pub fn set(&self, value: impl Into<Value>) -> Result<bool> {
        self.handle.set(self.key.clone(), value)
    }

    /// The handle the property belongs to.
    pub fn handle(&self) -> &Reactive {
        &self.handle
    }

    /// The property key.
    pub fn key(&self) -> &Key {
        &self.key
    }
}

/// A [`PropRef`] for `key` of `handle`.
pub fn to_ref(handle: &Reactive, key: impl Into<Key>) -> PropRef {
    PropRef {
        handle: handle.clone(),
        key: key.into(),
    }
}

/// A [`PropRef`] for every current key of `handle`.
pub fn to_refs(handle: &Reactive) -> Result<IndexMap<Key, PropRef>> {
    let keys = handle.raw().keys()?;
    Ok(keys
        .into_iter()
        .map(|key| (key.clone(), to_ref(handle, key)))
        .collect())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
