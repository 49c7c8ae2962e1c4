//! Document values and their ordering.
//!
//! Cells of an item block hold JSON documents. This module adds the pieces the
//! execution engine needs on top of `serde_json::Value`: the cross-type sort
//! order used by grouping and sorting, truthiness, numeric normalization and a
//! rough heap-size estimate for memory accounting.

use std::cmp::Ordering;
use std::mem::size_of;

use serde_json::{Map, Number, Value};

/// Dynamically-typed document value stored in a register.
pub type AqlValue = Value;

/// Assign a numeric order to value types for mixed-type comparisons.
pub fn type_order(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compare two values.
///
/// `null < bool < number < string < array < object`. Numbers compare by their
/// f64 value, arrays element-wise (shorter prefix first), objects by their
/// sorted keys and then by the values under those keys.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => compare_slices(x, y),
        (Value::Object(x), Value::Object(y)) => compare_objects(x, y),
        _ => type_order(a).cmp(&type_order(b)),
    }
}

/// Lexicographic comparison of value tuples (group keys, sort keys).
pub fn compare_slices(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match compare(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(0.0);
    let b = y.as_f64().unwrap_or(0.0);
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn compare_objects(x: &Map<String, Value>, y: &Map<String, Value>) -> Ordering {
    let mut keys_x: Vec<&String> = x.keys().collect();
    let mut keys_y: Vec<&String> = y.keys().collect();
    keys_x.sort();
    keys_y.sort();
    match keys_x.cmp(&keys_y) {
        Ordering::Equal => {}
        other => return other,
    }
    for key in keys_x {
        match compare(&x[key], &y[key]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Value equality under the engine's ordering (`1 == 1.0`).
pub fn equals(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Equal
}

/// Boolean interpretation used by filters.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric view of a value, `None` for anything that is not a number.
pub fn as_number(v: &Value) -> Option<f64> {
    v.as_f64()
}

/// Build a number value, keeping integral results integral.
///
/// Non-finite results become `null`.
pub fn number(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Value::from(f as i64);
    }
    Value::from(f)
}

/// Rough number of heap bytes owned by a value.
pub fn memory_usage(v: &Value) -> usize {
    match v {
        Value::Null | Value::Bool(_) | Value::Number(_) => 0,
        Value::String(s) => s.capacity(),
        Value::Array(items) => {
            items.capacity() * size_of::<Value>() + items.iter().map(memory_usage).sum::<usize>()
        }
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.capacity() + size_of::<Value>() + memory_usage(v))
            .sum(),
    }
}

/// A value ordered by [`compare`], usable as a set or map key.
#[derive(Debug, Clone)]
pub struct OrderedValue(pub Value);

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        equals(&self.0, &other.0)
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}
