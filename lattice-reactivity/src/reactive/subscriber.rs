//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive
//! locations. Effects are subscribers, and so is the effect inside every
//! computed and watcher.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::graph::DepRef;

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. Buckets are keyed by this
/// ID, which is what makes subscribing idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The reverse list of buckets a subscriber is a member of.
pub(crate) type DepList = SmallVec<[DepRef; 4]>;

/// A computation that can be notified when its dependencies change.
///
/// The graph stores subscribers as `Rc<dyn Subscriber>` so effects with
/// different result types can share buckets.
pub(crate) trait Subscriber {
    /// Get the subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Buckets this subscriber currently belongs to.
    ///
    /// Must mirror exactly which buckets contain the subscriber.
    fn deps(&self) -> &RefCell<DepList>;

    /// Whether the subscriber still reacts to changes.
    fn is_active(&self) -> bool;

    /// One of the dependencies changed: re-run or hand off to the scheduler.
    fn notify(self: Rc<Self>);

    /// Permanently deactivate and unsubscribe from every bucket.
    fn stop(&self);
}

/// Remove the subscriber from every bucket it belongs to.
pub(crate) fn cleanup_subscriber(subscriber: &dyn Subscriber) {
    let deps = std::mem::take(&mut *subscriber.deps().borrow_mut());
    let id = subscriber.id();
    for dep in deps {
        // Dropped outside the borrow: releasing the last handle can run
        // teardown that touches other buckets.
        let removed = dep.borrow_mut().remove(id);
        drop(removed);
    }
}
