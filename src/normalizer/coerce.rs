// Shape coercion for untrusted raw fields. Every function here is total:
// a missing or mistyped value resolves to a default, never to an error.

use serde_json::Value;

/// Render a scalar as text. Strings pass through, numbers and booleans are
/// formatted; null, arrays and objects yield `None`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Text field with an empty default.
pub fn text_or_empty(value: Option<&Value>) -> String {
    value.and_then(scalar_text).unwrap_or_default()
}

/// Text field that counts as absent when blank.
pub fn non_blank_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
}

/// Coerce a list-typed field:
/// - array → one string per element (nulls dropped, nested values as compact JSON)
/// - scalar → single-element list (blank strings give an empty list)
/// - null / missing → empty list
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(list_item).collect(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(other) => list_item(other).into_iter().collect(),
    }
}

fn list_item(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        scalar => scalar_text(scalar),
    }
}
