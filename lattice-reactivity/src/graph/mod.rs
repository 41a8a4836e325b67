//! Dependency Graph
//!
//! This module holds the storage primitives of the dependency graph:
//! targets, keys and the subscriber buckets that hang off them.
//!
//! # Overview
//!
//! The graph is a two-level mapping:
//!
//! ```text
//! TargetId -> (Key -> Dep)
//! Dep      =  set of subscribers + generation markers
//! ```
//!
//! Subscribers (effects, and the effects inside computeds) keep a reverse
//! list of the buckets they belong to, so unsubscribing never requires a
//! scan of the whole graph. The mapping itself is owned by
//! [`Runtime`](crate::reactive::Runtime), which implements `track` and
//! `trigger` on top of these types.
//!
//! # Design Decisions
//!
//! 1. Targets are keyed by a stable integer handle rather than by object
//!    identity. Entries are removed by an explicit release instead of a
//!    garbage collector.
//!
//! 2. One reserved key, [`Key::Iterate`], stands for "the shape of this
//!    target changed" and is what enumeration subscribes to.
//!
//! 3. Buckets use insertion-ordered sets so propagation order is
//!    deterministic.

mod dep;
mod target;

pub(crate) use dep::{Dep, DepRef};
pub use target::{Key, TargetId, TriggerOp};
