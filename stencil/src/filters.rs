//! Built-in filter library.
//!
//! A filter is a plain function from an input value and argument list to a
//! new value. Filters marked safe suppress auto-escaping of the expression
//! they appear in. Several text filters map over arrays and object values
//! instead of stringifying the whole collection.

use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde_json::{Map, Value};
use stencil_escape::{escape, Html, Js};
use stencil_parser::FilterSet;

use crate::error::Error;
use crate::value::display;

pub type FilterFn = dyn Fn(Value, &[Value]) -> Result<Value, Error> + Send + Sync;

#[derive(Clone)]
pub(crate) struct FilterEntry {
    pub(crate) func: Arc<FilterFn>,
    pub(crate) safe: bool,
}

/// Registered filters, by name.
#[derive(Default)]
pub(crate) struct Filters {
    map: HashMap<String, FilterEntry>,
}

impl Filters {
    pub(crate) fn set(
        &mut self,
        name: &str,
        safe: bool,
        func: impl Fn(Value, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    ) {
        self.map.insert(
            name.to_owned(),
            FilterEntry {
                func: Arc::new(func),
                safe,
            },
        );
    }

    pub(crate) fn get(&self, name: &str) -> Option<&FilterEntry> {
        self.map.get(name)
    }
}

impl FilterSet for Filters {
    fn has_filter(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    fn is_safe(&self, name: &str) -> bool {
        self.map.get(name).map(|e| e.safe).unwrap_or(false)
    }
}

pub(crate) fn builtins() -> Filters {
    let mut filters = Filters::default();
    filters.set("addslashes", false, |v, _| Ok(each_string(v, addslashes)));
    filters.set("capitalize", false, |v, _| Ok(each_string(v, capitalize)));
    filters.set("default", false, default);
    filters.set("e", true, escape_filter);
    filters.set("escape", true, escape_filter);
    filters.set("first", false, first);
    filters.set("join", false, join);
    filters.set("json", true, json);
    filters.set("last", false, last);
    filters.set("length", false, length);
    filters.set("lower", false, |v, _| {
        Ok(each_string(v, |s| s.to_lowercase()))
    });
    filters.set("raw", true, |v, _| Ok(v));
    filters.set("replace", false, replace);
    filters.set("reverse", false, reverse);
    filters.set("safe", true, |v, _| Ok(v));
    filters.set("title", false, |v, _| Ok(each_string(v, title)));
    filters.set("upper", false, |v, _| {
        Ok(each_string(v, |s| s.to_uppercase()))
    });
    filters.set("url_encode", false, |v, _| Ok(each_string(v, url_encode)));
    filters.set("url_decode", false, |v, _| Ok(each_string(v, url_decode)));
    filters
}

/// Applies `f` to a string input, to each element of an array, or to each
/// value of an object. Other values pass through untouched.
fn each_string(v: Value, f: impl Fn(String) -> String + Copy) -> Value {
    match v {
        Value::String(s) => Value::String(f(s)),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| each_string(v, f)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, each_string(v, f)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

fn addslashes(s: String) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

fn capitalize(s: String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => s,
    }
}

fn title(s: String) -> String {
    s.split_inclusive(char::is_whitespace)
        .map(|word| capitalize(word.to_owned()))
        .collect()
}

/// Falls back to the first argument when the input is missing or falsy,
/// except that zero is kept.
fn default(v: Value, args: &[Value]) -> Result<Value, Error> {
    let fallback = args.first().cloned().unwrap_or(Value::Null);
    let keep = match &v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    };
    Ok(if keep { v } else { fallback })
}

fn escape_filter(v: Value, args: &[Value]) -> Result<Value, Error> {
    let Value::String(s) = v else {
        return Ok(v);
    };
    let mode = args.first().map(display).unwrap_or_default();
    let escaped = if mode == "js" {
        escape(&s, Js).to_string()
    } else {
        escape(&s, Html).to_string()
    };
    Ok(Value::String(escaped))
}

fn first(v: Value, _: &[Value]) -> Result<Value, Error> {
    Ok(match v {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        Value::String(s) => s
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        Value::Object(map) => map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn last(v: Value, _: &[Value]) -> Result<Value, Error> {
    Ok(match v {
        Value::Array(items) => items.into_iter().next_back().unwrap_or(Value::Null),
        Value::String(s) => s
            .chars()
            .next_back()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        Value::Object(map) => map
            .into_iter()
            .next_back()
            .map(|(_, v)| v)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn join(v: Value, args: &[Value]) -> Result<Value, Error> {
    let Value::Array(items) = v else {
        return Ok(v);
    };
    let sep = args.first().map(display).unwrap_or_else(|| ",".into());
    Ok(Value::String(
        items.iter().map(display).collect::<Vec<_>>().join(&sep),
    ))
}

fn json(v: Value, args: &[Value]) -> Result<Value, Error> {
    let pretty = matches!(args.first(), Some(Value::Number(_)));
    let out = if pretty {
        serde_json::to_string_pretty(&v)
    } else {
        serde_json::to_string(&v)
    };
    out.map(Value::String).map_err(|err| Error::Filter {
        name: "json".into(),
        msg: err.to_string(),
    })
}

fn length(v: Value, _: &[Value]) -> Result<Value, Error> {
    Ok(match v {
        Value::String(s) => Value::from(s.chars().count()),
        Value::Array(items) => Value::from(items.len()),
        Value::Object(map) => Value::from(map.len()),
        _ => Value::Null,
    })
}

/// Regex search and replace. The third argument holds regex flags: `g`
/// replaces every match, `i` matches case-insensitively.
fn replace(v: Value, args: &[Value]) -> Result<Value, Error> {
    let input = display(&v);
    let search = args.first().map(display).unwrap_or_default();
    let replacement = args.get(1).map(display).unwrap_or_default();
    let flags = args.get(2).map(display).unwrap_or_default();

    let pattern = if flags.contains('i') {
        format!("(?i){search}")
    } else {
        search
    };
    let re = Regex::new(&pattern).map_err(|err| Error::Filter {
        name: "replace".into(),
        msg: err.to_string(),
    })?;
    let out = if flags.contains('g') {
        re.replace_all(&input, replacement.as_str())
    } else {
        re.replace(&input, replacement.as_str())
    };
    Ok(Value::String(out.into_owned()))
}

fn reverse(v: Value, _: &[Value]) -> Result<Value, Error> {
    Ok(match v {
        Value::Array(mut items) => {
            items.reverse();
            Value::Array(items)
        }
        Value::String(s) => Value::String(s.chars().rev().collect()),
        other => other,
    })
}

/// Characters kept verbatim by `url_encode`, mirroring the unreserved set
/// of `encodeURIComponent`.
const URL_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn url_encode(s: String) -> String {
    utf8_percent_encode(&s, URL_KEEP).to_string()
}

fn url_decode(s: String) -> String {
    percent_decode_str(&s).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(name: &str, v: Value, args: &[Value]) -> Value {
        let filters = builtins();
        let entry = filters.get(name).expect("builtin filter");
        (entry.func)(v, args).unwrap()
    }

    #[test]
    fn test_default() {
        assert_eq!(apply("default", json!(null), &[json!("x")]), json!("x"));
        assert_eq!(apply("default", json!(""), &[json!("x")]), json!("x"));
        assert_eq!(apply("default", json!(false), &[json!("x")]), json!("x"));
        assert_eq!(apply("default", json!(0), &[json!("x")]), json!(0));
        assert_eq!(apply("default", json!("a"), &[json!("x")]), json!("a"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            apply("e", json!("<p>"), &[]),
            json!("&lt;p&gt;")
        );
        assert_eq!(
            apply("e", json!("\"q\""), &[json!("js")]),
            json!("\\u0022q\\u0022")
        );
        assert_eq!(apply("e", json!(5), &[]), json!(5));
    }

    #[test]
    fn test_first_last() {
        assert_eq!(apply("first", json!([1, 2, 3]), &[]), json!(1));
        assert_eq!(apply("last", json!([1, 2, 3]), &[]), json!(3));
        assert_eq!(apply("first", json!("abc"), &[]), json!("a"));
        assert_eq!(apply("last", json!({"a": 1, "b": 2}), &[]), json!(2));
    }

    #[test]
    fn test_join() {
        assert_eq!(
            apply("join", json!([1, 2, 3]), &[json!(" + ")]),
            json!("1 + 2 + 3")
        );
        assert_eq!(apply("join", json!("ab"), &[]), json!("ab"));
    }

    #[test]
    fn test_length() {
        assert_eq!(apply("length", json!("héllo"), &[]), json!(5));
        assert_eq!(apply("length", json!([1, 2]), &[]), json!(2));
        assert_eq!(apply("length", json!({"a": 1}), &[]), json!(1));
        assert_eq!(apply("length", json!(12), &[]), json!(null));
    }

    #[test]
    fn test_case_filters() {
        assert_eq!(apply("upper", json!("ab"), &[]), json!("AB"));
        assert_eq!(apply("lower", json!("AB"), &[]), json!("ab"));
        assert_eq!(apply("capitalize", json!("hELLO"), &[]), json!("Hello"));
        assert_eq!(apply("title", json!("war and peace"), &[]), json!("War And Peace"));
        assert_eq!(apply("upper", json!(["a", "b"]), &[]), json!(["A", "B"]));
    }

    #[test]
    fn test_replace() {
        assert_eq!(
            apply("replace", json!("aaa"), &[json!("a"), json!("b")]),
            json!("baa")
        );
        assert_eq!(
            apply(
                "replace",
                json!("aaa"),
                &[json!("a"), json!("b"), json!("g")]
            ),
            json!("bbb")
        );
        assert_eq!(
            apply(
                "replace",
                json!("Aaa"),
                &[json!("a"), json!("b"), json!("gi")]
            ),
            json!("bbb")
        );
    }

    #[test]
    fn test_reverse() {
        assert_eq!(apply("reverse", json!([1, 2, 3]), &[]), json!([3, 2, 1]));
        assert_eq!(apply("reverse", json!("abc"), &[]), json!("cba"));
    }

    #[test]
    fn test_url_filters() {
        assert_eq!(
            apply("url_encode", json!("a b&c"), &[]),
            json!("a%20b%26c")
        );
        assert_eq!(
            apply("url_decode", json!("a%20b%26c"), &[]),
            json!("a b&c")
        );
    }

    #[test]
    fn test_addslashes() {
        assert_eq!(
            apply("addslashes", json!("\"he said\""), &[]),
            json!("\\\"he said\\\"")
        );
    }

    #[test]
    fn test_json() {
        assert_eq!(
            apply("json", json!({"a": 1}), &[]),
            json!("{\"a\":1}")
        );
    }

    #[test]
    fn test_safe_flags() {
        let filters = builtins();
        assert!(filters.is_safe("safe"));
        assert!(filters.is_safe("raw"));
        assert!(filters.is_safe("e"));
        assert!(!filters.is_safe("upper"));
    }
}
