//! Request parameters and their canonical cache keys.

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// An entity's fields as received from, or sent to, the server.
pub type Record = Map<String, Value>;

/// Query parameters of a fetch. Same shape as a record.
pub type Params = Map<String, Value>;

/// Converts a JSON value into a record, rejecting anything but an object.
pub fn into_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(Error::NotAnObject("null")),
        Value::Bool(_) => Err(Error::NotAnObject("a boolean")),
        Value::Number(_) => Err(Error::NotAnObject("a number")),
        Value::String(_) => Err(Error::NotAnObject("a string")),
        Value::Array(_) => Err(Error::NotAnObject("an array")),
    }
}

/// Returns whether every non-null field of `partial` is present in `stored`
/// with an equal value. Extra fields in `stored` are allowed, so the empty
/// partial set matches everything.
pub fn matches_subset(stored: &Params, partial: &Params) -> bool {
    partial
        .iter()
        .filter(|(_, v)| !v.is_null())
        .all(|(k, v)| stored.get(k) == Some(v))
}

/// Canonical serialization of a parameter set.
///
/// Object keys are sorted at every nesting level, so two value-equal
/// parameter sets always produce the same key regardless of the order in
/// which their fields were inserted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamsKey(String);

impl ParamsKey {
    /// Computes the canonical key for `params`.
    pub fn of(params: &Params) -> Self {
        let mut out = String::new();
        write_object(params, &mut out);
        Self(out)
    }

    /// Returns the key's string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Params> for ParamsKey {
    fn from(params: &Params) -> Self {
        Self::of(params)
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // Display on a JSON string handles escaping.
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
