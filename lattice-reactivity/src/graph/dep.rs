//! Dependency Buckets
//!
//! A `Dep` is the set of subscribers attached to one reactive location. Each
//! bucket also carries two generation bitmasks used while a subscriber
//! re-runs:
//!
//! - `was_tracked`: the bucket held the subscriber before the run started
//! - `new_tracked`: the bucket was read during the current run
//!
//! One bit is used per nesting depth, so a nested run never clobbers the
//! markers of the run that contains it. After the run, buckets marked as
//! "was" but not "new" drop the subscriber and everything else is kept,
//! which avoids re-inserting into buckets read on every run.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::reactive::{Subscriber, SubscriberId};

/// Shared handle to a bucket. Subscribers keep these in their `deps` list.
pub(crate) type DepRef = Rc<RefCell<Dep>>;

#[derive(Default)]
pub(crate) struct Dep {
    subscribers: IndexMap<SubscriberId, Rc<dyn Subscriber>>,
    was_tracked: u32,
    new_tracked: u32,
}

impl Dep {
    pub(crate) fn new_ref() -> DepRef {
        Rc::new(RefCell::new(Dep::default()))
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Returns `true` if the subscriber was not already a member.
    pub(crate) fn insert(&mut self, subscriber: Rc<dyn Subscriber>) -> bool {
        let id = subscriber.id();
        if self.subscribers.contains_key(&id) {
            return false;
        }
        self.subscribers.insert(id, subscriber);
        true
    }

    pub(crate) fn remove(&mut self, id: SubscriberId) -> Option<Rc<dyn Subscriber>> {
        self.subscribers.shift_remove(&id)
    }

    pub(crate) fn drain(&mut self) -> Vec<Rc<dyn Subscriber>> {
        self.subscribers.drain(..).map(|(_, subscriber)| subscriber).collect()
    }

    pub(crate) fn subscribers(&self) -> impl Iterator<Item = &Rc<dyn Subscriber>> {
        self.subscribers.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.was_tracked & bit != 0
    }

    pub(crate) fn new_tracked(&self, bit: u32) -> bool {
        self.new_tracked & bit != 0
    }

    pub(crate) fn mark_was_tracked(&mut self, bit: u32) {
        self.was_tracked |= bit;
    }

    pub(crate) fn mark_new_tracked(&mut self, bit: u32) {
        self.new_tracked |= bit;
    }

    pub(crate) fn clear_markers(&mut self, bit: u32) {
        self.was_tracked &= !bit;
        self.new_tracked &= !bit;
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
            .field("was_tracked", &format_args!("{:#b}", self.was_tracked))
            .field("new_tracked", &format_args!("{:#b}", self.new_tracked))
            .finish()
    }
}
