//! Error types for the reactivity runtime.

use crate::graph::{Key, TargetId};
use crate::observe::ContainerKind;

/// Errors raised by observation-layer operations.
///
/// Writes through read-only handles are not errors: they are logged and
/// ignored.
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// The container behind a handle was released from the arena.
    #[error("container {0} has been released")]
    Released(TargetId),

    /// The operation does not apply to this kind of container.
    #[error("expected a {expected} container, found a {found}")]
    WrongKind {
        /// What the operation accepts
        expected: &'static str,
        /// What the handle points at
        found: ContainerKind,
    },

    /// The key cannot address a slot of this container.
    #[error("key {key} is not valid for a {kind} container")]
    InvalidKey {
        /// The container kind
        kind: ContainerKind,
        /// The offending key
        key: Key,
    },

    /// A non-integer value was written to a sequence length.
    #[error("invalid sequence length {0}")]
    InvalidLength(String),

    /// A scalar was supplied where a container is required.
    #[error("value is not a container")]
    NotAContainer,

    /// A container reaches itself while being snapshotted.
    #[error("container {0} contains itself")]
    Cycle(TargetId),

    /// Snapshotting a container to JSON failed.
    #[error("snapshot failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
