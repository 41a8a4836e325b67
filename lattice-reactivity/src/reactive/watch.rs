//! Watchers
//!
//! A watcher pairs a source with a callback. The source is read inside a
//! lazy effect; whenever something it read changes, the effect's scheduler
//! re-reads the source and calls the callback with the new and previous
//! values.
//!
//! Sources are anything implementing [`WatchSource`]: closures, signals,
//! computeds, and reactive handles. A handle is traversed deeply on every
//! read so that a change anywhere inside it fires the callback.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::graph::TargetId;
use crate::observe::{Reactive, Value};

use super::computed::Computed;
use super::effect::{EffectScheduler, ReactiveEffect};
use super::scheduler::{queue_job, Job};
use super::signal::Signal;

/// When the callback of a watcher runs relative to the triggering write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchFlush {
    /// During the write that changed the source.
    #[default]
    Sync,

    /// On the next scheduler flush; repeated writes before it coalesce.
    Queued,
}

/// Options accepted by [`watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    immediate: bool,
    flush: WatchFlush,
}

impl WatchOptions {
    /// Call the callback once on creation, with no previous value.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Choose when the callback runs.
    pub fn flush(mut self, flush: WatchFlush) -> Self {
        self.flush = flush;
        self
    }
}

/// Something a watcher can read.
pub trait WatchSource {
    /// The value handed to the callback.
    type Output: Clone + PartialEq + 'static;

    /// A getter reading the source inside the watcher's effect.
    fn into_getter(self) -> Box<dyn Fn() -> Self::Output>;

    /// Deep sources fire the callback on every change, even when the
    /// output compares equal.
    fn is_deep(&self) -> bool {
        false
    }
}

impl<T, F> WatchSource for F
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    type Output = T;

    fn into_getter(self) -> Box<dyn Fn() -> T> {
        Box::new(self)
    }
}

impl<T: Clone + PartialEq + 'static> WatchSource for Signal<T> {
    type Output = T;

    fn into_getter(self) -> Box<dyn Fn() -> T> {
        Box::new(move || self.get())
    }
}

impl<T: Clone + PartialEq + 'static> WatchSource for Computed<T> {
    type Output = T;

    fn into_getter(self) -> Box<dyn Fn() -> T> {
        Box::new(move || self.get())
    }
}

impl WatchSource for Reactive {
    type Output = Reactive;

    fn into_getter(self) -> Box<dyn Fn() -> Reactive> {
        Box::new(move || {
            if let Err(err) = traverse(&self) {
                tracing::warn!(error = %err, "watch source could not be traversed");
            }
            self.clone()
        })
    }

    fn is_deep(&self) -> bool {
        true
    }
}

/// Read every key of `handle` and of every container nested in it.
///
/// Inside a tracked computation this subscribes to the whole structure.
/// Each container is visited once, so cycles terminate.
pub fn traverse(handle: &Reactive) -> Result<()> {
    let mut seen = HashSet::new();
    traverse_inner(handle, &mut seen)
}

fn traverse_inner(handle: &Reactive, seen: &mut HashSet<TargetId>) -> Result<()> {
    if !seen.insert(handle.raw().id()) {
        return Ok(());
    }
    for key in handle.own_keys()? {
        if let Value::Handle(child) = handle.get(key)? {
            traverse_inner(&child, seen)?;
        }
    }
    Ok(())
}

/// Registrar for a cleanup that runs before the next callback, or when the
/// watcher stops.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnCleanup {
    /// Register `cleanup`, replacing one registered earlier and not yet run.
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }

    fn run_pending(&self) {
        let cleanup = self.slot.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.slot.borrow().is_some())
            .finish()
    }
}

type Callback<T> = Box<dyn FnMut(&T, Option<&T>, &OnCleanup)>;

struct WatchState<T: 'static> {
    effect: RefCell<Option<ReactiveEffect<T>>>,
    callback: RefCell<Callback<T>>,
    old_value: RefCell<Option<T>>,
    cleanup: OnCleanup,
    deep: bool,
    running: Cell<bool>,
    pending: Cell<bool>,
}

struct Running<'a>(&'a Cell<bool>);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: Clone + PartialEq + 'static> WatchState<T> {
    /// Re-read the source and call back if it changed.
    ///
    /// A change that arrives while the callback is running is handled once
    /// the callback returns, not by re-entering it.
    fn fire(&self) {
        if self.running.replace(true) {
            self.pending.set(true);
            return;
        }
        let _running = Running(&self.running);

        loop {
            self.pending.set(false);
            let Some(effect) = self.effect.borrow().clone() else {
                return;
            };
            if !effect.is_active() {
                return;
            }

            let new_value = effect.run();
            let changed = self.deep || self.old_value.borrow().as_ref() != Some(&new_value);
            if changed {
                self.cleanup.run_pending();
                let old_value = self.old_value.borrow_mut().take();
                (self.callback.borrow_mut())(&new_value, old_value.as_ref(), &self.cleanup);
                *self.old_value.borrow_mut() = Some(new_value);
            }

            if !self.pending.get() {
                return;
            }
        }
    }
}

/// Handle to a running watcher.
pub struct WatchHandle<T: 'static> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> WatchHandle<T> {
    /// Stop watching and run the pending cleanup, if any.
    pub fn stop(&self) {
        self.effect.stop();
    }

    /// Whether the watcher still reacts to changes.
    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    /// The effect reading the source.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.effect
    }
}

impl<T: 'static> fmt::Debug for WatchHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WatchHandle").field(&self.effect).finish()
    }
}

/// Call `callback(new, old, on_cleanup)` whenever `source` changes.
///
/// The watcher lives until it is stopped, directly or through the scope it
/// was created in.
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle<S::Output>
where
    S: WatchSource,
    F: FnMut(&S::Output, Option<&S::Output>, &OnCleanup) + 'static,
{
    let deep = source.is_deep();
    let getter = source.into_getter();

    let state = Rc::new(WatchState {
        effect: RefCell::new(None),
        callback: RefCell::new(Box::new(callback)),
        old_value: RefCell::new(None),
        cleanup: OnCleanup::default(),
        deep,
        running: Cell::new(false),
        pending: Cell::new(false),
    });

    let job = {
        let state = Rc::clone(&state);
        Job::new(move || state.fire())
    };
    let scheduler: Box<dyn Fn()> = match options.flush {
        WatchFlush::Sync => {
            let job = job.clone();
            Box::new(move || job.run())
        }
        WatchFlush::Queued => {
            let job = job.clone();
            Box::new(move || {
                queue_job(&job);
            })
        }
    };

    let effect = ReactiveEffect::new(getter, Some(EffectScheduler::Custom(scheduler)), None);
    *state.effect.borrow_mut() = Some(effect.clone());

    // Stopping releases the state, which breaks the effect -> job -> state cycle.
    let on_stop_state = Rc::clone(&state);
    effect.on_stop(move || {
        on_stop_state.cleanup.run_pending();
        on_stop_state.effect.borrow_mut().take();
    });

    if options.immediate {
        job.run();
    } else {
        let initial = effect.run();
        *state.old_value.borrow_mut() = Some(initial);
    }

    WatchHandle { effect }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{reactive, Raw};
    use crate::reactive::{flush_jobs, signal};

    type Log<T> = Rc<RefCell<Vec<(T, Option<T>)>>>;

    fn logging<T: Clone + 'static>(log: &Log<T>) -> impl FnMut(&T, Option<&T>, &OnCleanup) + 'static {
        let log = log.clone();
        move |new: &T, old: Option<&T>, _: &OnCleanup| log.borrow_mut().push((new.clone(), old.cloned()))
    }

    #[test]
    fn watch_getter_reports_new_and_old() {
        let n = signal(1);
        let log: Log<i32> = Rc::default();

        let n_clone = n.clone();
        let _handle = watch(move || n_clone.get() * 10, logging(&log), WatchOptions::default());
        assert!(log.borrow().is_empty());

        n.set(2);
        n.set(3);
        assert_eq!(*log.borrow(), vec![(20, Some(10)), (30, Some(20))]);
    }

    #[test]
    fn unchanged_getter_output_is_not_reported() {
        let n = signal(1);
        let log: Log<bool> = Rc::default();

        let n_clone = n.clone();
        let _handle = watch(move || n_clone.get() > 0, logging(&log), WatchOptions::default());

        n.set(2);
        assert!(log.borrow().is_empty());

        n.set(-1);
        assert_eq!(*log.borrow(), vec![(false, Some(true))]);
    }

    #[test]
    fn immediate_fires_with_no_old_value() {
        let n = signal(7);
        let log: Log<i32> = Rc::default();

        let _handle = watch(n.clone(), logging(&log), WatchOptions::default().immediate());
        assert_eq!(*log.borrow(), vec![(7, None)]);
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let n = signal(0);
        let cleaned = Rc::new(Cell::new(0));

        let cleaned_clone = cleaned.clone();
        let handle = watch(
            n.clone(),
            move |_: &i32, _: Option<&i32>, on_cleanup: &OnCleanup| {
                let cleaned = cleaned_clone.clone();
                on_cleanup.register(move || cleaned.set(cleaned.get() + 1));
            },
            WatchOptions::default(),
        );

        n.set(1);
        assert_eq!(cleaned.get(), 0);
        n.set(2);
        assert_eq!(cleaned.get(), 1);

        handle.stop();
        assert_eq!(cleaned.get(), 2);
        assert!(!handle.is_active());

        n.set(3);
        assert_eq!(cleaned.get(), 2);
    }

    #[test]
    fn reactive_source_is_watched_deeply() {
        let inner = Raw::record_from([("x", Value::from(1))]);
        let outer = reactive(Raw::record_from([("inner", Value::from(inner))]));
        let fired = Rc::new(Cell::new(0));

        let fired_clone = fired.clone();
        let _handle = watch(
            outer.clone(),
            move |_: &Reactive, _: Option<&Reactive>, _: &OnCleanup| fired_clone.set(fired_clone.get() + 1),
            WatchOptions::default(),
        );

        reactive(inner).set("x", 2).unwrap();
        assert_eq!(fired.get(), 1);

        outer.set("extra", true).unwrap();
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn queued_flush_coalesces_changes() {
        let n = signal(0);
        let log: Log<i32> = Rc::default();

        let _handle = watch(
            n.clone(),
            logging(&log),
            WatchOptions::default().flush(WatchFlush::Queued),
        );

        n.set(1);
        n.set(2);
        n.set(3);
        assert!(log.borrow().is_empty());

        assert_eq!(flush_jobs(), 1);
        assert_eq!(*log.borrow(), vec![(3, Some(0))]);
    }

    #[test]
    fn callback_writing_its_source_settles() {
        let n = signal(0);
        let calls = Rc::new(Cell::new(0));

        let (n_clone, calls_clone) = (n.clone(), calls.clone());
        let _handle = watch(
            n.clone(),
            move |new: &i32, _: Option<&i32>, _: &OnCleanup| {
                calls_clone.set(calls_clone.get() + 1);
                if *new < 3 {
                    n_clone.set(new + 1);
                }
            },
            WatchOptions::default(),
        );

        n.set(1);
        assert_eq!(n.get_untracked(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn traverse_handles_cycles() {
        let a = Raw::record();
        let b = Raw::record_from([("a", Value::from(a))]);
        a.set("b", b).unwrap();

        assert!(traverse(&reactive(a)).is_ok());
    }
}
