//! Isolation copies of session payloads.
//!
//! Every value handed out of, or taken into, a store passes through here.
//! The result shares no backing storage with its source, so mutations on
//! either side are never observable through the other.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::value::Value;

/// Deepest nesting of lists and maps accepted in a payload.
pub const MAX_DEPTH: usize = 64;

/// Produce an isolated copy of `value`.
///
/// Fails with [`Error::UnsupportedType`] if the value nests deeper than
/// [`MAX_DEPTH`] or holds a non-finite float, neither of which survives a
/// trip through a durable backend.
pub fn deep_copy(value: &Value) -> Result<Value> {
    copy_at(value, 1)
}

/// Produce an isolated copy of a whole payload map.
pub fn deep_copy_map(values: &HashMap<String, Value>) -> Result<HashMap<String, Value>> {
    values
        .iter()
        .map(|(key, value)| Ok((key.clone(), copy_at(value, 1)?)))
        .collect()
}

/// Check that `value` can be stored without copying it.
pub fn validate(value: &Value) -> Result<()> {
    validate_at(value, 1)
}

fn copy_at(value: &Value, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(too_deep());
    }
    Ok(match value {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::Int(n) => Value::Int(*n),
        Value::Float(n) => Value::Float(finite(*n)?),
        Value::String(s) => Value::String(s.clone()),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| copy_at(item, depth + 1))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), copy_at(v, depth + 1)?)))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
    })
}

fn validate_at(value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(too_deep());
    }
    match value {
        Value::Float(n) => finite(*n).map(|_| ()),
        Value::List(items) => items.iter().try_for_each(|v| validate_at(v, depth + 1)),
        Value::Map(map) => map.values().try_for_each(|v| validate_at(v, depth + 1)),
        _ => Ok(()),
    }
}

fn finite(n: f64) -> Result<f64> {
    if n.is_finite() {
        Ok(n)
    } else {
        Err(Error::UnsupportedType(format!("non-finite number {n}")))
    }
}

fn too_deep() -> Error {
    Error::UnsupportedType(format!("value nested deeper than {MAX_DEPTH} levels"))
}
