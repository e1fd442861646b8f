//! Value utility functions shared across modules
//!
//! Nested field access, numeric coercion, deep equality and the total
//! ordering used by sort.

use serde_json::Value;
use std::cmp::Ordering;

/// Get nested value from JSON with dot notation support
///
/// Supports simple fields (`"user"`), nested objects (`"details.addr"`) and
/// array indexing (`"tags.0"`).
pub fn get_nested_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut value = doc;
    for part in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => {
                if let Ok(index) = part.parse::<usize>() {
                    value = arr.get(index)?;
                } else {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(value)
}

/// Coerce a JSON value to f64 for numeric comparison.
///
/// Only numbers coerce; strings, booleans and the rest yield `None`.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Deep equality over JSON values.
///
/// Same kind, same value; arrays element-wise in order; objects field-wise.
/// With `numeric_coercion` disabled (the default), `42` and `42.0` are NOT
/// equal: serde_json keeps integer and float representations distinct and
/// so do we. With coercion enabled, numbers compare by f64 value.
pub fn values_equal(a: &Value, b: &Value, numeric_coercion: bool) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if numeric_coercion {
                match (x.as_f64(), y.as_f64()) {
                    (Some(fx), Some(fy)) => fx == fy,
                    _ => x == y,
                }
            } else {
                x == y
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|(x, y)| values_equal(x, y, numeric_coercion))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| {
                    ys.get(k)
                        .map(|y| values_equal(x, y, numeric_coercion))
                        .unwrap_or(false)
                })
        }
        _ => a == b,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total ordering over JSON values for sorting: kind rank first, then value.
///
/// Numbers compare numerically, strings lexicographically, arrays
/// element-wise. A missing value sorts before everything.
pub fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(av), Some(bv)) => {
            let rank = kind_rank(av).cmp(&kind_rank(bv));
            if rank != Ordering::Equal {
                return rank;
            }
            match (av, bv) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::Number(x), Value::Number(y)) => {
                    let fx = x.as_f64().unwrap_or(f64::NAN);
                    let fy = y.as_f64().unwrap_or(f64::NAN);
                    fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
                }
                (Value::String(x), Value::String(y)) => x.cmp(y),
                (Value::Array(xs), Value::Array(ys)) => {
                    for (x, y) in xs.iter().zip(ys) {
                        let cmp = sort_cmp(Some(x), Some(y));
                        if cmp != Ordering::Equal {
                            return cmp;
                        }
                    }
                    xs.len().cmp(&ys.len())
                }
                // Objects: fall back to canonical text (serde_json maps are
                // ordered, so this is deterministic).
                (Value::Object(_), Value::Object(_)) => {
                    let xs = serde_json::to_string(av).unwrap_or_default();
                    let ys = serde_json::to_string(bv).unwrap_or_default();
                    xs.cmp(&ys)
                }
                _ => Ordering::Equal,
            }
        }
    }
}
