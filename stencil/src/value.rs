//! Value coercion rules for template evaluation.
//!
//! Context data is plain JSON, but the operators follow loose scripting
//! semantics: empty strings and zero are falsy while arrays and objects are
//! always truthy, `==` coerces across types where `===` does not, and `+`
//! concatenates as soon as either side is stringish.

use serde_json::{Map, Number, Value};
use stencil_parser::fmt_num;

pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders a value the way variable output does. `null` is empty, arrays
/// join their elements with commas, objects collapse to a placeholder.
pub(crate) fn display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => num_display(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".into(),
    }
}

fn num_display(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        fmt_num(n.as_f64().unwrap_or(0.0))
    }
}

/// Builds a number value, collapsing integral floats to integers. A
/// non-finite result has no JSON representation and becomes `null`.
pub(crate) fn number(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&f) {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Numeric coercion: booleans become 0/1, numeric strings parse, `null` is
/// zero. Anything else has no numeric value.
pub(crate) fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse().ok()
            }
        }
        _ => None,
    }
}

pub(crate) fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => std::mem::discriminant(a) == std::mem::discriminant(b) && a == b,
    }
}

pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => strict_eq(a, b),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

pub(crate) fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => None,
    }
}

/// Membership test for the `in` comparator: substring for strings, element
/// for arrays, key for objects.
pub(crate) fn contains(container: &Value, item: &Value) -> bool {
    match container {
        Value::String(s) => s.contains(&display(item)),
        Value::Array(items) => items.iter().any(|v| strict_eq(v, item)),
        Value::Object(map) => map.contains_key(&display(item)),
        _ => false,
    }
}

pub(crate) fn add(a: &Value, b: &Value) -> Value {
    let stringish = |v: &Value| {
        matches!(
            v,
            Value::String(_) | Value::Array(_) | Value::Object(_)
        )
    };
    if stringish(a) || stringish(b) {
        Value::String(format!("{}{}", display(a), display(b)))
    } else {
        arith(a, b, |x, y| x + y)
    }
}

pub(crate) fn arith(a: &Value, b: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => number(f(x, y)),
        _ => Value::Null,
    }
}

/// Walks a value down a key path with safe navigation: any miss yields
/// `null` instead of an error.
pub(crate) fn walk(value: &Value, segs: &[String]) -> Value {
    let mut cur = value;
    for seg in segs {
        cur = match step(cur, seg) {
            Some(next) => next,
            None => return Value::Null,
        };
    }
    cur.clone()
}

fn step<'a>(value: &'a Value, seg: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Indexing with a computed key, as in `a[b]`.
pub(crate) fn index(value: &Value, idx: &Value) -> Value {
    match value {
        Value::Array(items) => as_number(idx)
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .and_then(|f| items.get(f as usize))
            .cloned()
            .unwrap_or(Value::Null),
        Value::Object(map) => map.get(&display(idx)).cloned().unwrap_or(Value::Null),
        Value::String(s) => as_number(idx)
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .and_then(|f| s.chars().nth(f as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Merges `over` on top of `base`, returning the combined map.
pub(crate) fn merge(base: &Map<String, Value>, over: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (k, v) in over {
        out.insert(k.clone(), v.clone());
    }
    out
}
