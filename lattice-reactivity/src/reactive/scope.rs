//! Effect Scopes
//!
//! A scope owns the effects created while it is current, cleanup callbacks
//! registered with [`on_scope_dispose`], and child scopes created while it is
//! current. Stopping a scope stops all of them.
//!
//! Detached scopes have no parent: they outlive the scope that was current
//! when they were created and must be stopped on their own.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::subscriber::Subscriber;

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<EffectScope>> = const { RefCell::new(None) };
}

struct ScopeInner {
    active: Cell<bool>,
    detached: bool,
    effects: RefCell<Vec<Rc<dyn Subscriber>>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    scopes: RefCell<Vec<EffectScope>>,
    parent: RefCell<Weak<ScopeInner>>,
    index: Cell<Option<usize>>,
}

/// An owner of effects, cleanups and child scopes.
///
/// Cloning shares the same scope.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope.
    ///
    /// Unless `detached`, the scope becomes a child of the current scope.
    pub fn new(detached: bool) -> Self {
        let scope = Self {
            inner: Rc::new(ScopeInner {
                active: Cell::new(true),
                detached,
                effects: RefCell::new(Vec::new()),
                cleanups: RefCell::new(Vec::new()),
                scopes: RefCell::new(Vec::new()),
                parent: RefCell::new(Weak::new()),
                index: Cell::new(None),
            }),
        };

        if !detached {
            if let Some(parent) = get_current_scope() {
                let mut children = parent.inner.scopes.borrow_mut();
                scope.inner.index.set(Some(children.len()));
                *scope.inner.parent.borrow_mut() = Rc::downgrade(&parent.inner);
                children.push(scope.clone());
            }
        }
        scope
    }

    /// Run `f` with this scope as the current scope.
    ///
    /// Effects and child scopes created by `f` are owned by this scope. An
    /// inactive scope still runs `f` but records nothing.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        if !self.is_active() {
            tracing::warn!("cannot run an inactive effect scope");
            return f();
        }
        let _current = CurrentScope::enter(self.clone());
        f()
    }

    /// Stop every owned effect, run cleanups, then stop child scopes.
    ///
    /// Idempotent. A non-detached scope also removes itself from its parent.
    pub fn stop(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, from_parent: bool) {
        let inner = &self.inner;
        if !inner.active.get() {
            return;
        }

        let effects = std::mem::take(&mut *inner.effects.borrow_mut());
        let effect_count = effects.len();
        for effect in effects {
            effect.stop();
        }

        let cleanups = std::mem::take(&mut *inner.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }

        let children = std::mem::take(&mut *inner.scopes.borrow_mut());
        for child in &children {
            child.stop_inner(true);
        }

        if !inner.detached && !from_parent {
            self.detach_from_parent();
        }
        *inner.parent.borrow_mut() = Weak::new();
        inner.active.set(false);

        tracing::debug!(
            effects = effect_count,
            children = children.len(),
            "effect scope stopped"
        );
    }

    /// Swap-remove this scope from its parent's children.
    fn detach_from_parent(&self) {
        let Some(parent) = self.inner.parent.borrow().upgrade() else {
            return;
        };
        let Some(index) = self.inner.index.take() else {
            return;
        };

        let mut children = parent.scopes.borrow_mut();
        if index >= children.len() || !Rc::ptr_eq(&children[index].inner, &self.inner) {
            return;
        }
        children.swap_remove(index);
        if let Some(moved) = children.get(index) {
            moved.inner.index.set(Some(index));
        }
    }

    /// Whether the scope has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Whether the scope was created without a parent link.
    pub fn is_detached(&self) -> bool {
        self.inner.detached
    }

    /// Number of effects owned by the scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Number of child scopes still attached.
    pub fn child_count(&self) -> usize {
        self.inner.scopes.borrow().len()
    }

    /// Register a callback to run when the scope stops.
    pub fn on_dispose(&self, cleanup: impl FnOnce() + 'static) {
        self.inner.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    fn record(&self, effect: Rc<dyn Subscriber>) {
        if self.is_active() {
            self.inner.effects.borrow_mut().push(effect);
        }
    }
}

impl PartialEq for EffectScope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EffectScope {}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("detached", &self.inner.detached)
            .field("effects", &self.effect_count())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Restores the previous current scope when dropped.
struct CurrentScope {
    previous: Option<EffectScope>,
}

impl CurrentScope {
    fn enter(scope: EffectScope) -> Self {
        let previous = ACTIVE_SCOPE.with(|active| active.borrow_mut().replace(scope));
        Self { previous }
    }
}

impl Drop for CurrentScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_SCOPE.with(|active| *active.borrow_mut() = previous);
    }
}

/// Create a scope; see [`EffectScope::new`].
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::new(detached)
}

/// The scope currently running, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|active| active.borrow().clone())
}

/// Register `cleanup` on the current scope.
///
/// Without a current scope the callback is dropped with a warning.
pub fn on_scope_dispose(cleanup: impl FnOnce() + 'static) {
    match get_current_scope() {
        Some(scope) => scope.on_dispose(cleanup),
        None => tracing::warn!("on_scope_dispose called without an active effect scope"),
    }
}

/// Record `effect` in `scope`, or in the current scope when `scope` is None.
pub(crate) fn record_effect_scope(effect: Rc<dyn Subscriber>, scope: Option<&EffectScope>) {
    match scope {
        Some(scope) => scope.record(effect),
        None => {
            if let Some(scope) = get_current_scope() {
                scope.record(effect);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Key, TargetId};
    use crate::reactive::{effect, effect_with, EffectOptions, EffectRunner, Runtime};

    fn tracking_effect(target: TargetId) -> EffectRunner<()> {
        effect(move || Runtime::track(target, Key::from("a")))
    }

    #[test]
    fn run_records_effects() {
        let target = TargetId::new();
        let scope = effect_scope(false);

        let runner = scope.run(|| tracking_effect(target));
        assert_eq!(scope.effect_count(), 1);
        assert!(get_current_scope().is_none());

        scope.stop();
        assert!(!runner.effect().is_active());
        assert!(!scope.is_active());
        assert_eq!(Runtime::subscriber_count(target, &Key::from("a")), 0);
    }

    #[test]
    fn run_returns_the_closure_result() {
        let scope = effect_scope(false);
        assert_eq!(scope.run(|| 7), 7);
    }

    #[test]
    fn nested_scopes_stop_together() {
        let target = TargetId::new();
        let parent = effect_scope(false);

        let (child, inner) = parent.run(|| {
            let child = effect_scope(false);
            let inner = child.run(|| tracking_effect(target));
            (child, inner)
        });
        assert_eq!(parent.child_count(), 1);

        parent.stop();
        assert!(!child.is_active());
        assert!(!inner.effect().is_active());
    }

    #[test]
    fn detached_scope_survives_parent() {
        let target = TargetId::new();
        let parent = effect_scope(false);

        let (detached, runner) = parent.run(|| {
            let detached = effect_scope(true);
            let runner = detached.run(|| tracking_effect(target));
            (detached, runner)
        });
        assert_eq!(parent.child_count(), 0);

        parent.stop();
        assert!(detached.is_active());
        assert!(runner.effect().is_active());

        detached.stop();
        assert!(!runner.effect().is_active());
    }

    #[test]
    fn stopped_child_is_swap_removed() {
        let parent = effect_scope(false);
        let (a, b, c) = parent.run(|| (effect_scope(false), effect_scope(false), effect_scope(false)));

        a.stop();
        assert_eq!(parent.child_count(), 2);

        // `c` moved into `a`'s slot; stopping it must still find it.
        c.stop();
        assert_eq!(parent.child_count(), 1);

        parent.stop();
        assert!(!b.is_active());
    }

    #[test]
    fn cleanups_run_after_effects_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = effect_scope(false);

        let (log_a, log_b, log_stop) = (log.clone(), log.clone(), log.clone());
        scope.run(|| {
            let _runner = effect_with(
                || {},
                EffectOptions::default().on_stop(move || log_stop.borrow_mut().push("effect")),
            );
            on_scope_dispose(move || log_a.borrow_mut().push("first"));
            on_scope_dispose(move || log_b.borrow_mut().push("second"));
        });

        scope.stop();
        scope.stop();
        assert_eq!(*log.borrow(), vec!["effect", "first", "second"]);
    }

    #[test]
    fn explicit_scope_option_wins_over_current() {
        let target = TargetId::new();
        let owner = effect_scope(true);
        let current = effect_scope(true);

        let runner = current.run(|| {
            effect_with(
                move || Runtime::track(target, Key::from("a")),
                EffectOptions::default().scope(&owner),
            )
        });
        assert_eq!(owner.effect_count(), 1);
        assert_eq!(current.effect_count(), 0);

        owner.stop();
        assert!(!runner.effect().is_active());
        assert_eq!(Runtime::subscriber_count(target, &Key::from("a")), 0);
    }

    #[test]
    fn inactive_scope_still_runs_but_records_nothing() {
        let scope = effect_scope(false);
        scope.stop();

        let runner = scope.run(|| effect(|| ()));
        assert!(runner.effect().is_active());
        assert_eq!(scope.effect_count(), 0);
    }

    #[test]
    fn on_scope_dispose_without_scope_is_ignored() {
        on_scope_dispose(|| panic!("must not run"));
    }

    #[test]
    fn panicking_run_restores_the_previous_scope() {
        let outer = effect_scope(false);
        let inner = effect_scope(true);

        outer.run(|| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                inner.run(|| panic!("scope body failed"))
            }));
            assert!(result.is_err());
            assert_eq!(get_current_scope(), Some(outer.clone()));
        });
        assert!(get_current_scope().is_none());
        assert!(inner.is_active());
    }
}
