//! Reactive Primitives
//!
//! This module implements the propagation kernel: effects, computeds,
//! scopes, the job scheduler and watchers, all driven by the dependency
//! graph in [`Runtime`].
//!
//! # Concepts
//!
//! ## Effects
//!
//! An effect is a computation that re-runs whenever something it read
//! changes. Every run re-subscribes it to exactly the locations that run
//! read, so branches that are no longer taken stop causing re-runs.
//!
//! ## Computeds
//!
//! A computed is a cached derived value. Changes to its inputs only mark it
//! dirty; the getter runs again on the next read.
//!
//! ## Scopes
//!
//! A scope collects the effects created inside it so they can be stopped
//! together.
//!
//! ## Scheduler
//!
//! Effects and watchers can defer their re-runs to a job queue, so many
//! writes in one turn produce one pass.
//!
//! # Implementation Notes
//!
//! The current computation and the current scope are thread-local stacks.
//! Reading a location while a computation is running records the
//! dependency. This is the "transparent reactivity" model used by Vue 3,
//! SolidJS and Leptos.

mod computed;
mod context;
mod effect;
mod runtime;
mod scheduler;
mod scope;
mod signal;
mod subscriber;
mod watch;

pub use computed::{computed, computed_with, Computed, ComputedOptions};
pub use context::{enable_tracking, pause_tracking, untracked, ReactiveContext, TrackingGuard, MAX_MARKER_BITS};
pub use effect::{effect, effect_with, stop, EffectOptions, EffectRunner, EffectScheduler, ReactiveEffect};
pub use runtime::Runtime;
pub use scheduler::{flush_jobs, has_pending_jobs, next_tick, queue_job, Job, JobId};
pub use scope::{effect_scope, get_current_scope, on_scope_dispose, EffectScope};
pub use signal::{deep_signal, signal, to_ref, to_refs, PropRef, Signal};
pub use subscriber::SubscriberId;
pub use watch::{traverse, watch, OnCleanup, WatchFlush, WatchHandle, WatchOptions, WatchSource};

pub(crate) use subscriber::Subscriber;
