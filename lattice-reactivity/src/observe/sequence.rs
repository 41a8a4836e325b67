//! Sequence instrumentation.
//!
//! Mutators that read the length before writing run with tracking paused:
//! inside an effect, the read would subscribe the effect to the length it is
//! about to change and the effect would re-run itself forever.
//!
//! Searches look through the wrapped values first and retry against the raw
//! data with the needle unwrapped, so searching for a container finds it
//! whether the caller holds the raw container or its handle.

use crate::error::Result;
use crate::graph::{Key, TriggerOp};
use crate::reactive::{pause_tracking, Runtime};

use super::handle::Reactive;
use super::store::{with_container, with_container_mut, ContainerKind};
use super::value::Value;

impl Reactive {
    fn expect_sequence(&self) -> Result<()> {
        with_container(self.raw(), |container| container.expect_kind(ContainerKind::Sequence))
    }

    /// Append `value`, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        self.expect_sequence()?;
        if self.is_readonly() {
            self.reject_write("push", None);
            return self.raw().len();
        }

        let _paused = pause_tracking();
        let len = self.len()?;
        self.set(Key::Index(len), value)?;
        Ok(len + 1)
    }

    /// Remove and return the last element. An empty sequence yields null.
    pub fn pop(&self) -> Result<Value> {
        self.expect_sequence()?;
        if self.is_readonly() {
            self.reject_write("pop", None);
            return Ok(Value::Null);
        }

        let _paused = pause_tracking();
        let (removed, new_len) = with_container_mut(self.raw(), |container| {
            let items = container.sequence_mut()?;
            Ok((items.pop(), items.len()))
        })?;
        let Some(removed) = removed else {
            return Ok(Value::Null);
        };
        self.trigger(Key::Length, TriggerOp::Set, Some(new_len));
        Ok(self.wrap(removed))
    }

    /// Remove and return the first element. An empty sequence yields null.
    pub fn shift(&self) -> Result<Value> {
        self.expect_sequence()?;
        if self.is_readonly() {
            self.reject_write("shift", None);
            return Ok(Value::Null);
        }

        let _paused = pause_tracking();
        let removed = with_container_mut(self.raw(), |container| {
            let items = container.sequence_mut()?;
            Ok((!items.is_empty()).then(|| items.remove(0)))
        })?;
        let Some(removed) = removed else {
            return Ok(Value::Null);
        };
        Runtime::trigger_shifted(self.raw().id(), 0);
        Ok(self.wrap(removed))
    }

    /// Insert `value` at the front, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize> {
        self.expect_sequence()?;
        if self.is_readonly() {
            self.reject_write("unshift", None);
            return self.raw().len();
        }

        let mut value = value.into();
        if !self.is_shallow() {
            value = value.to_raw();
        }

        let _paused = pause_tracking();
        let len = with_container_mut(self.raw(), |container| {
            let items = container.sequence_mut()?;
            items.insert(0, value);
            Ok(items.len())
        })?;
        Runtime::trigger_shifted(self.raw().id(), 0);
        Ok(len)
    }

    /// Truncate or pad with nulls to `len`.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.expect_sequence()?;
        self.set(Key::Length, len).map(drop)
    }

    /// Whether the sequence holds `needle`.
    pub fn includes(&self, needle: &Value) -> Result<bool> {
        Ok(self.index_of(needle)?.is_some())
    }

    /// Position of the first element equal to `needle`.
    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        self.search(needle, |values, needle| values.iter().position(|value| value.strict_equals(needle)))
    }

    /// Position of the last element equal to `needle`.
    pub fn last_index_of(&self, needle: &Value) -> Result<Option<usize>> {
        self.search(needle, |values, needle| values.iter().rposition(|value| value.strict_equals(needle)))
    }

    fn search(&self, needle: &Value, find: impl Fn(&[Value], &Value) -> Option<usize>) -> Result<Option<usize>> {
        self.expect_sequence()?;
        let wrapped = self.values()?;
        if let Some(position) = find(&wrapped, needle) {
            return Ok(Some(position));
        }
        let raw = self.raw().values()?;
        Ok(find(&raw, &needle.to_raw()))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
