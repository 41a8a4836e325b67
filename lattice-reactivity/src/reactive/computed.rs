//! Computed Implementation
//!
//! A Computed is a cached derived value backed by a lazy effect.
//!
//! # How Computeds Work
//!
//! 1. Constructing a computed does not run the getter.
//!
//! 2. The first read runs the getter through the effect, caching the result
//!    and subscribing the effect to whatever the getter read.
//!
//! 3. When one of those inputs changes, the effect's scheduler marks the
//!    computed dirty and notifies the computed's own readers. Nothing is
//!    recomputed yet.
//!
//! 4. The next read sees the dirty flag and recomputes.
//!
//! Invalidation only notifies readers on the clean-to-dirty transition, so
//! any number of input changes between two reads cost one notification.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::graph::{Key, TargetId, TriggerOp};

use super::effect::{EffectScheduler, ReactiveEffect};
use super::runtime::Runtime;

/// Getter and optional setter for [`computed_with`].
pub struct ComputedOptions<T> {
    get: Box<dyn Fn() -> T>,
    set: Option<Box<dyn Fn(T)>>,
}

impl<T> ComputedOptions<T> {
    /// Options for a read-only computed.
    pub fn new(get: impl Fn() -> T + 'static) -> Self {
        Self {
            get: Box::new(get),
            set: None,
        }
    }

    /// Accept writes by forwarding them to `set`.
    pub fn setter(mut self, set: impl Fn(T) + 'static) -> Self {
        self.set = Some(Box::new(set));
        self
    }
}

struct ComputedInner<T: 'static> {
    target: TargetId,
    dirty: Cell<bool>,
    value: RefCell<Option<T>>,
    effect: ReactiveEffect<T>,
    setter: Option<Box<dyn Fn(T)>>,
}

/// A cached derived value.
///
/// Cloning shares the same cache.
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    fn from_options(options: ComputedOptions<T>) -> Self {
        let ComputedOptions { get, set } = options;

        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let invalidate = move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.dirty.replace(true) {
                    Runtime::trigger(inner.target, Key::Value, TriggerOp::Set, None);
                }
            };

            ComputedInner {
                target: TargetId::new(),
                dirty: Cell::new(true),
                value: RefCell::new(None),
                effect: ReactiveEffect::new(
                    get,
                    Some(EffectScheduler::Custom(Box::new(invalidate))),
                    None,
                ),
                setter: set,
            }
        });

        Self { inner }
    }

    /// Read the value, recomputing first if an input changed.
    ///
    /// Inside a tracked computation this subscribes to the computed.
    pub fn get(&self) -> T {
        let inner = &self.inner;
        Runtime::track(inner.target, Key::Value);

        if !inner.dirty.get() {
            if let Some(value) = inner.value.borrow().as_ref() {
                return value.clone();
            }
        }

        inner.dirty.set(false);
        let value = inner.effect.run();
        *inner.value.borrow_mut() = Some(value.clone());
        value
    }

    /// Forward `value` to the setter.
    ///
    /// Without a setter the write is ignored with a warning.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => tracing::warn!(
                target_id = %self.inner.target,
                "write to a computed without a setter ignored"
            ),
        }
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether writes are accepted.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// The graph target readers of this computed subscribe to.
    pub fn target(&self) -> TargetId {
        self.inner.target
    }

    /// The effect that runs the getter.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    /// Detach from all inputs. The cached value stays readable.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    /// The last clone is gone: detach the getter from its inputs and drop
    /// the buckets of the computed's own readers.
    fn drop(&mut self) {
        self.effect.stop();
        Runtime::release(self.target);
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.inner.target)
            .field("dirty", &self.inner.dirty.get())
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

/// Create a read-only computed from `get`.
pub fn computed<T, F>(get: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::from_options(ComputedOptions::new(get))
}

/// Create a computed from options, optionally writable.
pub fn computed_with<T: Clone + 'static>(options: ComputedOptions<T>) -> Computed<T> {
    Computed::from_options(options)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
