//! JSON bridge.
//!
//! Containers can be built from a `serde_json::Value` and snapshotted back
//! into one. Snapshots read the raw data and never track. A structure that
//! contains itself cannot be snapshotted.

use std::cell::RefCell;
use std::collections::HashSet;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{ReactiveError, Result};
use crate::graph::TargetId;

use super::handle::Reactive;
use super::store::{with_container, Container, Raw};
use super::value::{MapKey, Value};

impl Raw {
    /// Build containers from JSON: objects become records, arrays become
    /// sequences.
    ///
    /// Fails with [`ReactiveError::NotAContainer`] for a JSON scalar.
    pub fn from_json(json: &serde_json::Value) -> Result<Raw> {
        match from_json_value(json) {
            Value::Raw(raw) => Ok(raw),
            _ => Err(ReactiveError::NotAContainer),
        }
    }

    /// Snapshot the container and everything nested in it.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        check_acyclic(*self, &mut Vec::new(), &mut HashSet::new())?;
        Ok(serde_json::to_value(self)?)
    }
}

impl Reactive {
    /// Snapshot the container behind the handle. Does not track.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        self.raw().to_json()
    }
}

fn from_json_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => Value::Raw(Raw::sequence_from(items.iter().map(from_json_value))),
        serde_json::Value::Object(props) => Value::Raw(Raw::record_from(
            props.iter().map(|(name, value)| (name.as_str(), from_json_value(value))),
        )),
    }
}

/// The containers directly referenced by `raw`.
fn children(raw: Raw) -> Result<Vec<Raw>> {
    with_container(raw, |container| {
        let mut found: Vec<Raw> = container.values().iter().filter_map(Value::as_raw).collect();
        if let Container::Map(entries) = container {
            found.extend(entries.keys().filter_map(|key| match key {
                MapKey::Object(raw) => Some(*raw),
                _ => None,
            }));
        }
        Ok(found)
    })
}

fn check_acyclic(raw: Raw, path: &mut Vec<TargetId>, done: &mut HashSet<TargetId>) -> Result<()> {
    if path.contains(&raw.id()) {
        return Err(ReactiveError::Cycle(raw.id()));
    }
    if done.contains(&raw.id()) {
        return Ok(());
    }

    path.push(raw.id());
    for child in children(raw)? {
        check_acyclic(child, path, done)?;
    }
    path.pop();
    done.insert(raw.id());
    Ok(())
}

/// Serializes a container, failing on cycles instead of recursing forever.
struct Snapshot<'a> {
    raw: Raw,
    path: &'a RefCell<Vec<TargetId>>,
}

struct SnapshotValue<'a> {
    value: &'a Value,
    path: &'a RefCell<Vec<TargetId>>,
}

fn map_key_string(key: &MapKey) -> String {
    match key {
        MapKey::Str(s) => s.to_string(),
        other => other.to_string(),
    }
}

impl Serialize for Raw {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let path = RefCell::new(Vec::new());
        Snapshot { raw: *self, path: &path }.serialize(serializer)
    }
}

impl Serialize for Snapshot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let id = self.raw.id();
        if self.path.borrow().contains(&id) {
            return Err(S::Error::custom(ReactiveError::Cycle(id)));
        }
        let container = with_container(self.raw, |container| Ok(container.clone())).map_err(S::Error::custom)?;

        self.path.borrow_mut().push(id);
        let path = self.path;
        let result = match &container {
            Container::Record(props) => {
                let mut map = serializer.serialize_map(Some(props.len()))?;
                for (name, item) in props {
                    map.serialize_entry(&**name, &SnapshotValue { value: item, path })?;
                }
                map.end()
            }
            Container::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&SnapshotValue { value: item, path })?;
                }
                seq.end()
            }
            Container::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in entries {
                    map.serialize_entry(&map_key_string(key), &SnapshotValue { value: item, path })?;
                }
                map.end()
            }
            Container::Set(members) => {
                let mut seq = serializer.serialize_seq(Some(members.len()))?;
                for member in members {
                    let member = member.to_value();
                    seq.serialize_element(&SnapshotValue { value: &member, path })?;
                }
                seq.end()
            }
        };
        self.path.borrow_mut().pop();
        result
    }
}

impl Serialize for SnapshotValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Raw(raw) => Snapshot { raw: *raw, path: self.path }.serialize(serializer),
            Value::Handle(handle) => Snapshot {
                raw: handle.raw(),
                path: self.path,
            }
            .serialize(serializer),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::observe::{reactive, ContainerKind};

    use super::*;

    #[test]
    fn from_json_builds_nested_containers() {
        let raw = Raw::from_json(&json!({"user": {"name": "ada"}, "tags": ["a", "b"]})).unwrap();
        let state = reactive(raw);

        let user = state.get("user").unwrap();
        let user = user.as_handle().unwrap();
        assert_eq!(user.get("name").unwrap(), Value::from("ada"));

        let tags = state.get("tags").unwrap();
        assert_eq!(tags.as_handle().unwrap().kind().unwrap(), ContainerKind::Sequence);
    }

    #[test]
    fn scalars_are_not_containers() {
        assert!(matches!(Raw::from_json(&json!(3)), Err(ReactiveError::NotAContainer)));
    }

    #[test]
    fn snapshot_round_trips() {
        let source = json!({"n": 1, "x": 1.5, "list": [true, null, "s"]});
        let raw = Raw::from_json(&source).unwrap();
        assert_eq!(raw.to_json().unwrap(), source);
    }

    #[test]
    fn snapshot_follows_handles_and_collections() {
        let inner = Raw::record_from([("k", 1)]);
        let outer = reactive(Raw::record());
        outer.set("inner", reactive(inner)).unwrap();
        outer.set("tags", Raw::set_from(["a", "b"])).unwrap();
        outer.set("lookup", Raw::map_from([(1, "one")])).unwrap();

        assert_eq!(
            outer.to_json().unwrap(),
            json!({"inner": {"k": 1}, "tags": ["a", "b"], "lookup": {"1": "one"}})
        );
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let shared = Raw::record();
        let raw = Raw::sequence_from([shared, shared]);
        assert_eq!(raw.to_json().unwrap(), json!([{}, {}]));
    }

    #[test]
    fn cycles_are_reported() {
        let a = Raw::record();
        a.set("me", a).unwrap();
        assert!(matches!(a.to_json(), Err(ReactiveError::Cycle(id)) if id == a.id()));
        assert!(serde_json::to_string(&a).is_err());
    }
}
