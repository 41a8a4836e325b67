//! Effect Implementation
//!
//! An Effect is a re-executable computation that re-subscribes to whatever
//! it reads on every run.
//!
//! # How Effects Work
//!
//! 1. When created (unless lazy), the effect runs its function immediately
//!    to establish initial dependencies.
//!
//! 2. When any dependency changes, the effect either re-runs directly or,
//!    if it has a scheduler, hands the re-run decision to the scheduler.
//!
//! 3. Each run diffs the read set against the previous run. Buckets read
//!    again are left alone; buckets no longer read drop the effect.
//!
//! # Re-subscription Markers
//!
//! Before a run, every bucket the effect belongs to is marked "was tracked"
//! with the bit for the current nesting depth. Reads during the run mark
//! buckets "newly tracked" and only buckets without the "was" bit get the
//! effect inserted. After the run, buckets with "was" but not "new" drop the
//! effect and both bits are cleared. Past [`MAX_MARKER_BITS`] levels of
//! nesting there are no bits left, and a run simply unsubscribes from
//! everything up front and re-tracks from scratch.
//!
//! # Stopping
//!
//! A stopped effect is unsubscribed everywhere and never re-runs on its own.
//! Running it manually still executes the body, without tracking. Stopping an
//! effect from inside its own run is deferred until the run ends so the reads
//! already made are attributed before the effect disowns them.
//!
//! [`MAX_MARKER_BITS`]: super::context::MAX_MARKER_BITS

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::{untracked, ReactiveContext};
use super::scheduler::{queue_job, Job};
use super::scope::{record_effect_scope, EffectScope};
use super::subscriber::{cleanup_subscriber, DepList, Subscriber, SubscriberId};

/// How an effect reacts when one of its dependencies changes.
pub enum EffectScheduler {
    /// Call this closure instead of re-running.
    Custom(Box<dyn Fn()>),

    /// Enqueue the re-run as a job for the next scheduler flush.
    Queued,
}

impl fmt::Debug for EffectScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectScheduler::Custom(_) => f.write_str("Custom(..)"),
            EffectScheduler::Queued => f.write_str("Queued"),
        }
    }
}

/// Options accepted by [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    lazy: bool,
    scheduler: Option<EffectScheduler>,
    scope: Option<EffectScope>,
    on_stop: Option<Box<dyn FnOnce()>>,
}

impl EffectOptions {
    /// Do not run on creation; the first run must be explicit.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Call `scheduler` on change instead of re-running.
    pub fn scheduler(mut self, scheduler: impl Fn() + 'static) -> Self {
        self.scheduler = Some(EffectScheduler::Custom(Box::new(scheduler)));
        self
    }

    /// Batch re-runs through the job queue.
    pub fn queued(mut self) -> Self {
        self.scheduler = Some(EffectScheduler::Queued);
        self
    }

    /// Record the effect in `scope` instead of the current scope.
    pub fn scope(mut self, scope: &EffectScope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    /// Called once when the effect is stopped.
    pub fn on_stop(mut self, on_stop: impl FnOnce() + 'static) -> Self {
        self.on_stop = Some(Box::new(on_stop));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler)
            .field("scope", &self.scope)
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

pub(crate) struct EffectInner<T> {
    id: SubscriberId,
    body: Box<dyn Fn() -> T>,
    scheduler: Option<Box<dyn Fn()>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    active: Cell<bool>,
    defer_stop: Cell<bool>,
    deps: RefCell<DepList>,
    run_count: Cell<usize>,
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deps(&self) -> &RefCell<DepList> {
        &self.deps
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn notify(self: Rc<Self>) {
        if !self.active.get() {
            return;
        }
        match &self.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                run_effect(&self);
            }
        }
    }

    fn stop(&self) {
        // Teardown waits for the run to finalize its markers, even when the
        // stop comes from an effect nested inside that run.
        if ReactiveContext::is_running(self.id) {
            self.defer_stop.set(true);
            return;
        }
        if !self.active.get() {
            return;
        }

        cleanup_subscriber(self);
        let on_stop = self.on_stop.borrow_mut().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
        self.active.set(false);
        tracing::debug!(subscriber = ?self.id, "effect stopped");
    }
}

/// Bookkeeping for one tracked run.
///
/// Entering pushes the context and marks existing buckets; dropping (also on
/// unwind) finalizes the markers, pops the context and performs a deferred
/// stop.
struct RunGuard<'a, T: 'static> {
    effect: &'a EffectInner<T>,
    context: Option<ReactiveContext>,
    marker_bit: Option<u32>,
}

impl<'a, T: 'static> RunGuard<'a, T> {
    fn enter(effect: &'a Rc<EffectInner<T>>) -> Self {
        let subscriber: Rc<dyn Subscriber> = Rc::clone(effect) as Rc<dyn Subscriber>;
        let context = ReactiveContext::enter(subscriber);

        let marker_bit = ReactiveContext::track_op_bit();
        match marker_bit {
            Some(bit) => init_dep_markers(effect.as_ref(), bit),
            None => cleanup_subscriber(effect.as_ref()),
        }

        Self {
            effect: effect.as_ref(),
            context: Some(context),
            marker_bit,
        }
    }
}

impl<T: 'static> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(bit) = self.marker_bit {
            finalize_dep_markers(self.effect, bit);
        }
        drop(self.context.take());

        if self.effect.defer_stop.replace(false) {
            self.effect.stop();
        }
    }
}

fn init_dep_markers(subscriber: &dyn Subscriber, bit: u32) {
    for dep in subscriber.deps().borrow().iter() {
        dep.borrow_mut().mark_was_tracked(bit);
    }
}

fn finalize_dep_markers(subscriber: &dyn Subscriber, bit: u32) {
    let id = subscriber.id();
    let mut removed = Vec::new();
    subscriber.deps().borrow_mut().retain(|dep| {
        let mut dep = dep.borrow_mut();
        let stale = dep.was_tracked(bit) && !dep.new_tracked(bit);
        if stale {
            removed.extend(dep.remove(id));
        }
        dep.clear_markers(bit);
        !stale
    });
    drop(removed);
}

fn run_effect<T: 'static>(effect: &Rc<EffectInner<T>>) -> T {
    effect.run_count.set(effect.run_count.get() + 1);
    if !effect.active.get() {
        return untracked(|| (effect.body)());
    }

    let _guard = RunGuard::enter(effect);
    (effect.body)()
}

/// A re-executable tracked computation.
///
/// Cloning shares the same effect.
pub struct ReactiveEffect<T: 'static> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an effect without running it.
    ///
    /// The effect is recorded in `scope`, or in the current scope if `scope`
    /// is `None`.
    pub fn new<F>(body: F, scheduler: Option<EffectScheduler>, scope: Option<&EffectScope>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<EffectInner<T>>| {
            let scheduler = scheduler.map(|scheduler| match scheduler {
                EffectScheduler::Custom(scheduler) => scheduler,
                EffectScheduler::Queued => queued_rerun(weak.clone()),
            });
            EffectInner {
                id: SubscriberId::new(),
                body: Box::new(body),
                scheduler,
                on_stop: RefCell::new(None),
                active: Cell::new(true),
                defer_stop: Cell::new(false),
                deps: RefCell::new(DepList::new()),
                run_count: Cell::new(0),
            }
        });

        record_effect_scope(Rc::clone(&inner) as Rc<dyn Subscriber>, scope);
        Self { inner }
    }

    /// Run the body, re-subscribing to whatever it reads.
    pub fn run(&self) -> T {
        run_effect(&self.inner)
    }

    /// Unsubscribe from everything and deactivate.
    ///
    /// Deferred until the end of the run when called from inside the
    /// effect's own body.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Register a callback to invoke when the effect is stopped.
    ///
    /// Replaces any previously registered callback.
    pub fn on_stop(&self, on_stop: impl FnOnce() + 'static) {
        *self.inner.on_stop.borrow_mut() = Some(Box::new(on_stop));
    }

    /// Whether the effect still reacts to changes.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Number of buckets the effect currently belongs to.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Number of times the body has been executed.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }
}

impl<T: 'static> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("run_count", &self.run_count())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

fn queued_rerun<T: 'static>(weak: Weak<EffectInner<T>>) -> Box<dyn Fn()> {
    let job = Job::new(move || {
        if let Some(effect) = weak.upgrade() {
            if effect.active.get() {
                run_effect(&effect);
            }
        }
    });
    Box::new(move || {
        queue_job(&job);
    })
}

/// Handle returned by [`effect`]: runs the effect on demand and exposes it.
pub struct EffectRunner<T: 'static> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> EffectRunner<T> {
    /// Run the effect now and return the body's result.
    pub fn run(&self) -> T {
        self.effect.run()
    }

    /// The underlying effect.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.effect
    }

    /// Stop the underlying effect.
    pub fn stop(&self) {
        self.effect.stop();
    }
}

impl<T: 'static> Clone for EffectRunner<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for EffectRunner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectRunner").field(&self.effect).finish()
    }
}

/// Create an effect and run it once to establish its dependencies.
pub fn effect<T, F>(body: F) -> EffectRunner<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    effect_with(body, EffectOptions::default())
}

/// Create an effect with explicit options.
pub fn effect_with<T, F>(body: F, options: EffectOptions) -> EffectRunner<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    let EffectOptions {
        lazy,
        scheduler,
        scope,
        on_stop,
    } = options;

    let effect = ReactiveEffect::new(body, scheduler, scope.as_ref());
    if let Some(on_stop) = on_stop {
        effect.on_stop(on_stop);
    }
    if !lazy {
        effect.run();
    }
    EffectRunner { effect }
}

/// Stop the effect behind a runner.
pub fn stop<T: 'static>(runner: &EffectRunner<T>) {
    runner.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
