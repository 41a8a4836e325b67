//! Lattice Reactivity
//!
//! This crate provides the fine-grained reactive runtime Lattice renders on
//! top of. It implements:
//!
//! - An observation layer that turns plain containers into tracked data
//! - A dependency graph recording which computation read which location
//! - Effects that re-run and re-subscribe when what they read changes
//! - Lazily recomputed computeds, lifecycle scopes and a batching scheduler
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Targets, keys and the subscriber buckets of the dependency graph
//! - `reactive`: Tracking context, runtime, effects, computeds, scopes,
//!   scheduler, watchers and signals
//! - `observe`: Containers, wrapped handles and their instrumentation
//! - `error`: The crate error type
//!
//! All state is thread-local and nothing here is `Send`: each thread runs an
//! independent runtime.
//!
//! # Example
//!
//! ```rust
//! use lattice_reactivity::observe::{reactive, Raw};
//! use lattice_reactivity::reactive::{computed, effect};
//!
//! let state = reactive(Raw::record_from([("count", 1)]));
//!
//! // A derived value, recomputed only when read after `count` changes
//! let source = state.clone();
//! let doubled = computed(move || source.get("count").ok().and_then(|v| v.as_f64()).unwrap_or(0.0) * 2.0);
//!
//! // An effect, re-run whenever `doubled` changes
//! let reader = doubled.clone();
//! let _runner = effect(move || println!("doubled: {}", reader.get()));
//!
//! state.set("count", 5).unwrap();
//! assert_eq!(doubled.get(), 10.0);
//! ```

pub mod error;
pub mod graph;
pub mod observe;
pub mod reactive;

pub use error::{ReactiveError, Result};
