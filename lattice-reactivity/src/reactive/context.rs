//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a reactive location is
//! read, the runtime can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (running an effect), we push the
//! subscriber onto the stack. When the computation completes, we pop it.
//!
//! This design supports nested reactive contexts (an effect created inside
//! another effect, or a computed read from inside an effect). The stack depth
//! also selects the generation bit used for re-subscription markers.
//!
//! A second, independent stack records whether tracking is enabled, so that
//! code such as sequence mutators can temporarily pause tracking.

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId};

/// Nesting depth up to which re-runs use generation-bit markers.
///
/// Beyond this depth a re-run falls back to unsubscribing from everything
/// and re-tracking from scratch.
pub const MAX_MARKER_BITS: u32 = 30;

thread_local! {
    static CONTEXT: RefCell<ContextState> = RefCell::new(ContextState::new());
}

struct ContextState {
    stack: Vec<ContextEntry>,
    should_track: bool,
    pause_stack: Vec<bool>,
}

impl ContextState {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            should_track: true,
            pause_stack: Vec::new(),
        }
    }
}

/// An entry in the reactive context stack.
struct ContextEntry {
    subscriber: Rc<dyn Subscriber>,
    /// Tracking flag in effect before this entry was pushed.
    saved_should_track: bool,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// Tracking is re-enabled for the duration of the context, even if the
    /// caller had paused it.
    pub(crate) fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        let subscriber_id = subscriber.id();
        CONTEXT.with(|context| {
            let mut context = context.borrow_mut();
            let saved_should_track = context.should_track;
            context.should_track = true;
            context.stack.push(ContextEntry {
                subscriber,
                saved_should_track,
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT.with(|context| !context.borrow().stack.is_empty())
    }

    /// Check if a read right now would be recorded as a dependency.
    pub fn is_tracking() -> bool {
        CONTEXT.with(|context| {
            let context = context.borrow();
            context.should_track && !context.stack.is_empty()
        })
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT.with(|context| {
            context
                .borrow()
                .stack
                .last()
                .map(|entry| entry.subscriber.id())
        })
    }

    pub(crate) fn current() -> Option<Rc<dyn Subscriber>> {
        CONTEXT.with(|context| {
            context
                .borrow()
                .stack
                .last()
                .map(|entry| Rc::clone(&entry.subscriber))
        })
    }

    /// Whether `id` is running at any depth, not only the innermost one.
    ///
    /// False once the context itself is gone during thread teardown.
    pub(crate) fn is_running(id: SubscriberId) -> bool {
        CONTEXT
            .try_with(|context| {
                context
                    .borrow()
                    .stack
                    .iter()
                    .any(|entry| entry.subscriber.id() == id)
            })
            .unwrap_or(false)
    }

    /// Number of computations currently running on this thread.
    pub fn depth() -> usize {
        CONTEXT.with(|context| context.borrow().stack.len())
    }

    /// Generation bit for the current depth, or `None` once the depth
    /// exceeds [`MAX_MARKER_BITS`].
    pub(crate) fn track_op_bit() -> Option<u32> {
        let depth = Self::depth();
        if depth == 0 || depth > MAX_MARKER_BITS as usize {
            return None;
        }
        Some(1 << depth)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT.with(|context| {
            let mut context = context.borrow_mut();
            let popped = context.stack.pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber.id(),
                    self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id,
                    entry.subscriber.id()
                );
                context.should_track = entry.saved_should_track;
            }
        });
    }
}

/// Guard returned by [`pause_tracking`] and [`enable_tracking`].
///
/// Restores the previous tracking flag when dropped.
#[must_use = "tracking is restored as soon as the guard is dropped"]
pub struct TrackingGuard {
    _private: (),
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        CONTEXT.with(|context| {
            let mut context = context.borrow_mut();
            let previous = context.pause_stack.pop().unwrap_or(true);
            context.should_track = previous;
        });
    }
}

fn push_tracking(enabled: bool) -> TrackingGuard {
    CONTEXT.with(|context| {
        let mut context = context.borrow_mut();
        let previous = context.should_track;
        context.pause_stack.push(previous);
        context.should_track = enabled;
    });
    TrackingGuard { _private: () }
}

/// Stop recording dependencies until the guard is dropped.
pub fn pause_tracking() -> TrackingGuard {
    push_tracking(false)
}

/// Record dependencies until the guard is dropped, even inside a paused
/// region.
pub fn enable_tracking() -> TrackingGuard {
    push_tracking(true)
}

/// Run `f` without recording any dependency it reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _paused = pause_tracking();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::reactive::subscriber::DepList;

    struct Listener {
        id: SubscriberId,
        deps: RefCell<DepList>,
    }

    impl Listener {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                deps: RefCell::new(DepList::new()),
            })
        }
    }

    impl Subscriber for Listener {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn deps(&self) -> &RefCell<DepList> {
            &self.deps
        }

        fn is_active(&self) -> bool {
            true
        }

        fn notify(self: Rc<Self>) {}

        fn stop(&self) {}
    }

    #[test]
    fn context_tracks_subscriber() {
        let listener = Listener::new();
        let id = listener.id;

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(listener);

            assert!(ReactiveContext::is_active());
            assert!(ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let outer = Listener::new();
        let inner = Listener::new();
        let (id1, id2) = (outer.id, inner.id);

        {
            let _ctx1 = ReactiveContext::enter(outer);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
            assert_eq!(ReactiveContext::track_op_bit(), Some(1 << 1));

            {
                let _ctx2 = ReactiveContext::enter(inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
                assert_eq!(ReactiveContext::track_op_bit(), Some(1 << 2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
        assert_eq!(ReactiveContext::track_op_bit(), None);
    }

    #[test]
    fn pause_and_restore_tracking() {
        let _ctx = ReactiveContext::enter(Listener::new());
        assert!(ReactiveContext::is_tracking());

        {
            let _paused = pause_tracking();
            assert!(!ReactiveContext::is_tracking());

            {
                let _enabled = enable_tracking();
                assert!(ReactiveContext::is_tracking());
            }

            assert!(!ReactiveContext::is_tracking());
        }

        assert!(ReactiveContext::is_tracking());
    }

    #[test]
    fn entering_a_context_re_enables_tracking() {
        let _paused = pause_tracking();
        {
            let _ctx = ReactiveContext::enter(Listener::new());
            assert!(ReactiveContext::is_tracking());
        }
        let _outer = ReactiveContext::enter(Listener::new());
        let value = untracked(ReactiveContext::is_tracking);
        assert!(!value);
    }

    #[test]
    fn marker_bits_run_out_past_the_limit() {
        let mut guards = Vec::new();
        for _ in 0..MAX_MARKER_BITS {
            guards.push(ReactiveContext::enter(Listener::new()));
        }
        assert_eq!(ReactiveContext::track_op_bit(), Some(1 << MAX_MARKER_BITS));

        guards.push(ReactiveContext::enter(Listener::new()));
        assert_eq!(ReactiveContext::track_op_bit(), None);

        while let Some(guard) = guards.pop() {
            drop(guard);
        }
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn is_running_sees_every_level() {
        let outer = Listener::new();
        let inner = Listener::new();
        let (outer_id, inner_id) = (outer.id, inner.id);

        let _outer = ReactiveContext::enter(outer);
        {
            let _inner = ReactiveContext::enter(inner);
            assert!(ReactiveContext::is_running(outer_id));
            assert!(ReactiveContext::is_running(inner_id));
        }
        assert!(!ReactiveContext::is_running(inner_id));
    }
}
