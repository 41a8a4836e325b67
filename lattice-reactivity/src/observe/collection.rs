//! Map and set instrumentation.
//!
//! Entry reads subscribe to the entry key; size and iteration subscribe to
//! the shape. A changed map value also reaches iteration, since iterating a
//! map yields its values, but not key-only iteration.

use crate::error::{ReactiveError, Result};
use crate::graph::{Key, TriggerOp};

use super::handle::Reactive;
use super::store::{with_container, with_container_mut, Container, ContainerKind};
use super::value::{MapKey, Value};

impl Reactive {
    fn expect_map(&self) -> Result<()> {
        with_container(self.raw(), |container| container.expect_kind(ContainerKind::Map))
    }

    fn expect_collection(&self) -> Result<()> {
        with_container(self.raw(), |container| match container.kind() {
            ContainerKind::Map | ContainerKind::Set => Ok(()),
            found => Err(ReactiveError::WrongKind {
                expected: "map or set",
                found,
            }),
        })
    }

    /// The value stored under `key`, or null.
    pub fn get_entry(&self, key: impl Into<MapKey>) -> Result<Value> {
        self.expect_map()?;
        self.get(Key::Entry(key.into()))
    }

    /// Store `value` under `key`.
    pub fn set_entry(&self, key: impl Into<MapKey>, value: impl Into<Value>) -> Result<()> {
        self.expect_map()?;
        self.set(Key::Entry(key.into()), value).map(drop)
    }

    /// Whether the map has `key`, or the set has the member `key`.
    pub fn has_entry(&self, key: impl Into<MapKey>) -> Result<bool> {
        self.expect_collection()?;
        self.has(Key::Entry(key.into()))
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete_entry(&self, key: impl Into<MapKey>) -> Result<bool> {
        self.expect_collection()?;
        self.delete(Key::Entry(key.into()))
    }

    /// Add a member to a set. Returns whether it was new.
    pub fn add(&self, member: impl Into<MapKey>) -> Result<bool> {
        let member = member.into();
        if self.is_readonly() {
            self.reject_write("add", Some(&Key::Entry(member)));
            return Ok(false);
        }

        let added = with_container_mut(self.raw(), |container| container.insert_member(member.clone()))?;
        if added {
            self.trigger(Key::Entry(member), TriggerOp::Add, None);
        }
        Ok(added)
    }

    /// Remove every entry, notifying every subscriber of the container.
    pub fn clear(&self) -> Result<()> {
        self.expect_collection()?;
        if self.is_readonly() {
            self.reject_write("clear", None);
            return Ok(());
        }

        let had_entries = with_container_mut(self.raw(), |container| Ok(container.clear()))?;
        if had_entries {
            self.trigger(Key::Iterate, TriggerOp::Clear, None);
        }
        Ok(())
    }

    /// Every entry as `(key, value)`, wrapped. Set members pair with
    /// themselves.
    pub fn entries(&self) -> Result<Vec<(Value, Value)>> {
        let entries = with_container(self.raw(), |container| match container {
            Container::Map(entries) => Ok(entries
                .iter()
                .map(|(key, value)| (key.to_value(), value.clone()))
                .collect::<Vec<_>>()),
            Container::Set(members) => Ok(members
                .iter()
                .map(|member| (member.to_value(), member.to_value()))
                .collect()),
            other => Err(ReactiveError::WrongKind {
                expected: "map or set",
                found: other.kind(),
            }),
        })?;
        self.track(Key::Iterate);
        Ok(entries
            .into_iter()
            .map(|(key, value)| (self.wrap(key), self.wrap(value)))
            .collect())
    }

    /// Every key of a map, or every member of a set, wrapped.
    ///
    /// Subscribes to the key set only: changing the value of an existing
    /// map entry does not reach this read.
    pub fn keys(&self) -> Result<Vec<Value>> {
        let keys = with_container(self.raw(), |container| match container {
            Container::Map(entries) => Ok(entries.keys().map(MapKey::to_value).collect::<Vec<_>>()),
            Container::Set(members) => Ok(members.iter().map(MapKey::to_value).collect()),
            other => Err(ReactiveError::WrongKind {
                expected: "map or set",
                found: other.kind(),
            }),
        })?;
        self.track(Key::KeyIterate);
        Ok(keys.into_iter().map(|key| self.wrap(key)).collect())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
