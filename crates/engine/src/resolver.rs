//! `{{path}}` template substitution against an execution context.
//!
//! Pure functions; safe to call concurrently from any number of runs.
//! A path that cannot be resolved is rendered as `[path not found]` so the
//! gap is visible in the tool's input instead of failing the node.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern is valid"))
}

/// Descend `context` along a dot-separated path.
///
/// Objects are indexed by key, arrays by numeric segment. JSON `null`
/// counts as absent.
pub fn lookup<'a>(path: &str, context: &'a Value) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.trim().split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Render a value for substitution into text. Floats get two decimals.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => format!("{:.2}", n.as_f64().unwrap_or_default()),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn not_found(path: &str) -> String {
    format!("[{} not found]", path.trim())
}

/// Replace every `{{path}}` in `template`.
pub fn resolve(template: &str, context: &Value) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            match lookup(path, context) {
                Some(value) => stringify(value),
                None => not_found(path),
            }
        })
        .into_owned()
}

/// Like [`resolve`], but a template consisting of exactly one placeholder
/// yields the referenced JSON value itself rather than its text form.
pub fn resolve_value(template: &str, context: &Value) -> Value {
    if let Some(caps) = placeholder().captures(template.trim()) {
        let whole = caps.get(0).map(|m| m.as_str().len()) == Some(template.trim().len());
        if whole {
            let path = &caps[1];
            return match lookup(path, context) {
                Some(value) => value.clone(),
                None => Value::String(not_found(path)),
            };
        }
    }
    Value::String(resolve(template, context))
}

/// Apply [`resolve`] to every string leaf of `value`, recursing through
/// objects and arrays. Non-string leaves are returned unchanged.
pub fn resolve_deep(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(resolve(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_deep(v, context)).collect()),
        Value::Object(map) => Value::Object(resolve_map(map, context)),
        other => other.clone(),
    }
}

/// [`resolve_deep`] over a node's params map.
pub fn resolve_map(params: &Map<String, Value>, context: &Value) -> Map<String, Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), resolve_deep(v, context)))
        .collect()
}
