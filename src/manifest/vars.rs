//! `${var}` expansion against the manifest's own `vars` block.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").ok());

/// Remove the top-level `vars` map and substitute its entries into every string
/// leaf of `doc`. Unknown `${name}` tokens are left as written.
pub fn expand_vars(doc: &mut Value) {
    let Some(vars) = doc.as_object_mut().and_then(|root| root.remove("vars")) else {
        return;
    };
    let Value::Object(vars) = vars else {
        return;
    };
    if vars.is_empty() {
        return;
    }
    if let Some(pattern) = VAR_PATTERN.as_ref() {
        substitute(doc, &vars, pattern);
    }
}

fn substitute(value: &mut Value, vars: &Map<String, Value>, pattern: &Regex) {
    match value {
        Value::String(text) if text.contains("${") => {
            let expanded = pattern.replace_all(text, |caps: &Captures<'_>| {
                match vars.get(caps[1].trim()) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => caps[0].to_string(),
                }
            });
            *text = expanded.into_owned();
        }
        Value::Array(items) => items.iter_mut().for_each(|item| substitute(item, vars, pattern)),
        Value::Object(map) => map.values_mut().for_each(|item| substitute(item, vars, pattern)),
        _ => {}
    }
}
