//! Dotted-path access into dynamic records.
//!
//! Records are viewed as [`serde_json::Value`]. A path such as
//! `"profile.name"` is split on `.` and walked through nested objects.
//! A missing key, a non-object intermediate, and an explicit `null` all
//! resolve to `None`, so "absent" and "null" are indistinguishable.

use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Resolve `path` inside `record`.
pub fn resolve<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// View any serializable record as a JSON value.
pub fn to_value<T: Serialize + ?Sized>(record: &T) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

/// Render a scalar-ish value as text, the way a UI would display it.
///
/// Arrays render their elements joined with `,`; objects render as
/// compact JSON. `null` has no text form.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| as_text(v).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Interpret a value as a number: JSON numbers directly, strings when
/// they parse as a float after trimming.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        _ => None,
    }
}

/// True for values that coerce to a string for comparison purposes.
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}
