//! Observation Layer
//!
//! Plain data lives in containers addressed by [`Raw`]. Wrapping a container
//! in a [`Reactive`] handle gives it tracked accessors: reads through the
//! handle subscribe the running computation, writes notify subscribers.
//!
//! # Overview
//!
//! ```text
//! Raw (arena slot)  --reactive()/readonly()/...-->  Reactive (mode + raw)
//!        |                                                |
//!   untracked get/set                       tracked get/set/has/delete/...
//! ```
//!
//! Containers come in four kinds (records, sequences, maps and sets). The
//! generic accessors work on all of them; sequences and collections add
//! their own methods on top.

mod collection;
mod handle;
mod json;
mod sequence;
mod store;
mod value;

pub use handle::{
    is_reactive, is_readonly, is_shallow, reactive, readonly, shallow_reactive, shallow_readonly, to_raw, Mode,
    Reactive, Target,
};
pub use store::{ContainerKind, Raw};
pub use value::{MapKey, Value};
