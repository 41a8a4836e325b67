//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive locations
//! to the computations that read them. It owns the dependency graph and
//! implements the two primitives everything else is built on.
//!
//! # How It Works
//!
//! 1. When a computation reads a location, [`Runtime::track`] adds the
//!    current subscriber to the location's bucket.
//!
//! 2. When a location is written, [`Runtime::trigger`]:
//!    a. Collects the location's bucket plus any buckets implied by the
//!       kind of change (shape sentinel, sequence length, truncated indices)
//!    b. Unions their subscribers into one run-set, skipping the subscriber
//!       that is currently executing and any that were stopped
//!    c. Notifies each subscriber once: either it re-runs, or its scheduler
//!       decides what to do
//!
//! 3. When a target is released, every bucket it owns is emptied and each
//!    former member forgets the bucket.
//!
//! # Thread Safety
//!
//! The graph lives in thread-local storage. Reactive values are not `Send`;
//! each thread has an independent runtime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::graph::{Dep, DepRef, Key, TargetId, TriggerOp};

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, SubscriberId};

type KeyToDep = IndexMap<Key, DepRef>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<TargetId, KeyToDep>> = RefCell::new(HashMap::new());
}

/// The reactive runtime.
///
/// A namespace for the graph primitives; all state is thread-local.
pub struct Runtime;

impl Runtime {
    /// Subscribe the current computation to `(target, key)`.
    ///
    /// No-op when nothing is running or tracking is paused. Subscribing is
    /// idempotent within a run.
    pub fn track(target: TargetId, key: Key) {
        if !ReactiveContext::is_tracking() {
            return;
        }
        let Some(subscriber) = ReactiveContext::current() else {
            return;
        };

        let dep = TARGET_MAP.with(|map| {
            let mut map = map.borrow_mut();
            Rc::clone(
                map.entry(target)
                    .or_default()
                    .entry(key)
                    .or_insert_with(Dep::new_ref),
            )
        });

        track_effect(&dep, subscriber);
    }

    /// Propagate a change of `(target, key)` to its subscribers.
    ///
    /// For `Key::Length` writes, `new_len` is the new length: every index
    /// bucket at or past it is notified as well.
    pub fn trigger(target: TargetId, key: Key, op: TriggerOp, new_len: Option<usize>) {
        let deps = TARGET_MAP.with(|map| {
            map.borrow()
                .get(&target)
                .map(|buckets| collect_deps(buckets, &key, op, new_len))
                .unwrap_or_default()
        });
        if deps.is_empty() {
            return;
        }

        let current = ReactiveContext::current_subscriber();
        let mut to_run: IndexMap<SubscriberId, Rc<dyn Subscriber>> = IndexMap::new();
        for dep in &deps {
            for subscriber in dep.borrow().subscribers() {
                let id = subscriber.id();
                if Some(id) == current || !subscriber.is_active() {
                    continue;
                }
                to_run.entry(id).or_insert_with(|| Rc::clone(subscriber));
            }
        }

        tracing::trace!(
            target_id = %target,
            key = %key,
            ?op,
            subscribers = to_run.len(),
            "trigger"
        );

        for subscriber in to_run.into_values() {
            subscriber.notify();
        }
    }

    /// Notify the length bucket and every index bucket at or past `from`.
    ///
    /// Used when elements move, as in `shift` and `unshift`.
    pub(crate) fn trigger_shifted(target: TargetId, from: usize) {
        Self::trigger(target, Key::Length, TriggerOp::Set, Some(from));
    }

    /// Remove every bucket owned by `target`.
    ///
    /// Each former subscriber drops the bucket from its own list, so no
    /// subscriber is left pointing at storage that no longer exists.
    /// Returns the number of buckets removed, zero once the graph itself is
    /// gone during thread teardown.
    pub fn release(target: TargetId) -> usize {
        let Ok(Some(buckets)) = TARGET_MAP.try_with(|map| map.borrow_mut().remove(&target)) else {
            return 0;
        };

        for dep in buckets.values() {
            let members = dep.borrow_mut().drain();
            for member in members {
                member.deps().borrow_mut().retain(|held| !Rc::ptr_eq(held, dep));
            }
        }
        buckets.len()
    }

    /// Number of subscribers currently attached to `(target, key)`.
    pub fn subscriber_count(target: TargetId, key: &Key) -> usize {
        TARGET_MAP.with(|map| {
            map.borrow()
                .get(&target)
                .and_then(|buckets| buckets.get(key))
                .map(|dep| dep.borrow().len())
                .unwrap_or(0)
        })
    }

    /// Number of buckets `target` owns.
    pub fn bucket_count(target: TargetId) -> usize {
        TARGET_MAP.with(|map| map.borrow().get(&target).map_or(0, IndexMap::len))
    }
}

/// Add `subscriber` to `dep` unless this run already did.
fn track_effect(dep: &DepRef, subscriber: Rc<dyn Subscriber>) {
    let should_track = match ReactiveContext::track_op_bit() {
        Some(bit) => {
            let mut dep = dep.borrow_mut();
            if dep.new_tracked(bit) {
                false
            } else {
                dep.mark_new_tracked(bit);
                !dep.was_tracked(bit)
            }
        }
        None => !dep.borrow().contains(subscriber.id()),
    };

    if should_track && dep.borrow_mut().insert(Rc::clone(&subscriber)) {
        subscriber.deps().borrow_mut().push(Rc::clone(dep));
    }
}

fn collect_deps(buckets: &KeyToDep, key: &Key, op: TriggerOp, new_len: Option<usize>) -> Vec<DepRef> {
    if op == TriggerOp::Clear {
        return buckets.values().cloned().collect();
    }

    let mut deps = Vec::new();

    if let (Key::Length, Some(new_len)) = (key, new_len) {
        for (bucket_key, dep) in buckets {
            match bucket_key {
                Key::Length => deps.push(Rc::clone(dep)),
                Key::Index(index) if *index >= new_len => deps.push(Rc::clone(dep)),
                _ => {}
            }
        }
        return deps;
    }

    let mut push = |bucket_key: &Key| {
        if let Some(dep) = buckets.get(bucket_key) {
            deps.push(Rc::clone(dep));
        }
    };

    push(key);
    match op {
        TriggerOp::Add | TriggerOp::Delete => {
            push(&Key::Iterate);
            match key {
                Key::Index(_) if op == TriggerOp::Add => push(&Key::Length),
                Key::Entry(_) => push(&Key::KeyIterate),
                _ => {}
            }
        }
        TriggerOp::Set => {
            // Map iteration yields values, so a changed value reshapes it.
            if matches!(key, Key::Entry(_)) {
                push(&Key::Iterate);
            }
        }
        TriggerOp::Clear => {}
    }
    deps
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
