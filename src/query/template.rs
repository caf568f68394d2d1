//! Follow-up URL templates.
//!
//! Placeholders are written `{name}` (or `${name}`) and are resolved against
//! the **top-level scalar properties** of the node that carried the link.
//! Nested paths such as `{author.id}` are not supported: the whole text
//! between the braces is looked up as one property name.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$?\{([^{}]+)\}").expect("placeholder pattern is valid")
});

/// Expand every placeholder in `template`.
///
/// Returns the name of the first placeholder that has no scalar value.
pub fn expand(template: &str, source: &Map<String, Value>) -> Result<String, String> {
    let mut expanded = String::with_capacity(template.len());
    let mut last = 0;

    for captures in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = source
            .get(key.as_str())
            .and_then(scalar_text)
            .ok_or_else(|| key.as_str().to_string())?;

        expanded.push_str(&template[last..whole.start()]);
        expanded.push_str(&value);
        last = whole.end();
    }
    expanded.push_str(&template[last..]);
    Ok(expanded)
}

/// Text form of a scalar JSON value. Objects and arrays have none.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_expand_placeholders() {
        let source = object(json!({ "id": 7, "slug": "rex", "active": true }));
        assert_eq!(
            expand("/dogs/{id}/{slug}?active=${active}", &source).unwrap(),
            "/dogs/7/rex?active=true"
        );
    }

    #[test]
    fn test_template_without_placeholders() {
        let source = object(json!({}));
        assert_eq!(expand("http://x/y", &source).unwrap(), "http://x/y");
    }

    #[test]
    fn test_nested_paths_are_not_resolved() {
        let source = object(json!({ "author": { "id": 1 } }));
        assert_eq!(expand("/a/{author.id}", &source).unwrap_err(), "author.id");
        assert_eq!(expand("/a/{author}", &source).unwrap_err(), "author");
    }

    #[test]
    fn test_missing_property() {
        let source = object(json!({ "id": 1 }));
        assert_eq!(expand("/a/{name}", &source).unwrap_err(), "name");
    }
}
