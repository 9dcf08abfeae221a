//! Lenient accessors over upstream JSON
//!
//! Upstream payloads are inconsistent: numbers arrive as numbers, numeric
//! strings, or booleans, and sub-objects are sometimes missing or of the wrong
//! type. Every accessor here is total and falls back to a zero value.

use mapleshard_common::types::EntityId;
use serde_json::Value;

/// Follow `path` through nested objects
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.as_object()?.get(*key))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Integer at `path`, or 0
pub fn int(value: &Value, path: &[&str]) -> i64 {
    lookup(value, path).and_then(as_i64).unwrap_or(0)
}

/// Trimmed string at `path`, or empty
pub fn text(value: &Value, path: &[&str]) -> String {
    match lookup(value, path) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Boolean at `path`; accepts `true`, non-zero numbers, and "true"/"1"
pub fn flag(value: &Value, path: &[&str]) -> bool {
    match lookup(value, path) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim(), "true" | "1"),
        Some(other) => as_i64(other).is_some_and(|n| n != 0),
        None => false,
    }
}

/// Positive entity id from a JSON value
pub fn entity_id(value: &Value) -> Option<EntityId> {
    as_i64(value)
        .filter(|n| *n > 0)
        .and_then(|n| EntityId::try_from(n).ok())
}

/// Ids listed at `path`, either as bare numbers or as objects carrying `id`
pub fn id_list(value: &Value, path: &[&str]) -> Vec<EntityId> {
    let Some(Value::Array(items)) = lookup(value, path) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => obj.get("id").and_then(entity_id),
            other => entity_id(other),
        })
        .collect()
}

/// Array at `path`, or an empty slice
pub fn array<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    match lookup(value, path) {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    }
}
