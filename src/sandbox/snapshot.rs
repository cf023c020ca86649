//=====================================================
// File: sandbox/snapshot.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Owned deep copies of runtime values
// Objective: Freeze arguments and results at observation time so later
//            mutation by the unit cannot rewrite recorded history
//=====================================================

use crate::interpreter::Value;
use crate::interpreter::value::{format_float, quote};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Immutable, thread-safe copy of a runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Snapshot>),
    Dict(BTreeMap<String, Snapshot>),
    Function(String),
    /// Back-reference to a container already being copied.
    Cycle,
}

impl Snapshot {
    pub fn capture(value: &Value) -> Self {
        capture(value, &mut Vec::new())
    }
}

fn capture(value: &Value, ancestors: &mut Vec<*const ()>) -> Snapshot {
    if let Some(id) = value.container_id() {
        if ancestors.contains(&id) {
            return Snapshot::Cycle;
        }
        ancestors.push(id);
    }

    let snapshot = match value {
        Value::Null => Snapshot::Null,
        Value::Bool(b) => Snapshot::Bool(*b),
        Value::Int(n) => Snapshot::Int(*n),
        Value::Float(f) => Snapshot::Float(*f),
        Value::String(s) => Snapshot::Str(s.clone()),
        Value::Function(callable) => Snapshot::Function(callable.name().to_string()),
        Value::List(items) => Snapshot::List(
            items
                .borrow()
                .iter()
                .map(|item| capture(item, ancestors))
                .collect(),
        ),
        Value::Object(entries) => Snapshot::Dict(
            entries
                .borrow()
                .iter()
                .map(|(key, item)| (key.clone(), capture(item, ancestors)))
                .collect(),
        ),
    };

    if value.container_id().is_some() {
        ancestors.pop();
    }
    snapshot
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Null => f.write_str("null"),
            Snapshot::Bool(b) => write!(f, "{}", b),
            Snapshot::Int(n) => write!(f, "{}", n),
            Snapshot::Float(x) => f.write_str(&format_float(*x)),
            Snapshot::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                quote(s, &mut out);
                f.write_str(&out)
            }
            Snapshot::Function(name) => write!(f, "<function {}>", name),
            Snapshot::Cycle => f.write_str("[...]"),
            Snapshot::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Snapshot::Dict(entries) => {
                f.write_str("{")?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, item)?;
                }
                f.write_str("}")
            }
        }
    }
}

// Plain JSON shapes; functions and cycles become marker strings.
impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Snapshot::Null => serializer.serialize_unit(),
            Snapshot::Bool(b) => serializer.serialize_bool(*b),
            Snapshot::Int(n) => serializer.serialize_i64(*n),
            Snapshot::Float(x) => serializer.serialize_f64(*x),
            Snapshot::Str(s) => serializer.serialize_str(s),
            Snapshot::Function(name) => serializer.serialize_str(&format!("<function {}>", name)),
            Snapshot::Cycle => serializer.serialize_str("[...]"),
            Snapshot::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Snapshot::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in entries {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_is_isolated_from_later_mutation() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let snapshot = Snapshot::capture(&list);
        if let Value::List(items) = &list {
            items.borrow_mut().push(Value::Int(3));
        }
        assert_eq!(snapshot, Snapshot::List(vec![Snapshot::Int(1), Snapshot::Int(2)]));
    }

    #[test]
    fn cycles_become_markers() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        let snapshot = Snapshot::capture(&list);
        assert_eq!(snapshot, Snapshot::List(vec![Snapshot::Int(1), Snapshot::Cycle]));
        assert_eq!(snapshot.to_string(), "[1, [...]]");
    }

    #[test]
    fn shared_but_acyclic_values_are_copied_twice() {
        let inner = Value::list(vec![Value::Int(7)]);
        let outer = Value::list(vec![inner.clone(), inner]);
        assert_eq!(Snapshot::capture(&outer).to_string(), "[[7], [7]]");
    }

    #[test]
    fn json_shapes() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), Value::list(vec![Value::Null, Value::Float(1.5)]));
        let snapshot = Snapshot::capture(&Value::object(entries));
        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json, serde_json::json!({"a": [null, 1.5]}));
    }
}

//=====================================================
// End of file
//=====================================================
