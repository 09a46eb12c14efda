//! # Utility Functions Module
//!
//! This module contains common utility functions used throughout the engine.
//! These utilities provide helper functionality for:
//! - JSON value navigation with dot-separated paths
//! - Rendering values into human-readable strings
//! - `$(name)` / `$(name.property)` error-message template substitution

use serde_json::Value;

/// Get nested value from JSON using dot notation path
///
/// Supports both object property access and array indexing:
/// - `"user.name"` - Access object property
/// - `"items.0"` - Access array element by index
/// - `"user.addresses.0.city"` - Combined object and array access
///
/// # Arguments
/// * `data` - The JSON value to navigate
/// * `path` - Dot-separated path to the target value
///
/// # Returns
/// * `Option<&Value>` - Reference to the value if found, None otherwise
pub fn get_nested_value<'b>(data: &'b Value, path: &str) -> Option<&'b Value> {
    if path.is_empty() {
        return Some(data);
    }

    let mut current = data;
    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part)?;
            }
            Value::Array(arr) => {
                let index = part.parse::<usize>().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Render a value the way it should read inside an error message or a
/// concatenated string: strings bare (no quotes), scalars via their JSON
/// form, composites as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Substitute `$(name)` and `$(name.property.path)` placeholders in an
/// error-message template with the corresponding input values.
///
/// Unresolvable placeholders are left verbatim so a typo in a template is
/// visible in the produced message rather than silently blanked.
pub fn format_error_message(template: &str, inputs: &serde_json::Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find(')') {
            Some(end) => {
                let path = &after[..end];
                let resolved = match path.split_once('.') {
                    None => inputs.get(path),
                    Some((name, subpath)) => inputs
                        .get(name)
                        .and_then(|value| get_nested_value(value, subpath)),
                };
                match resolved {
                    Some(value) => out.push_str(&display_value(value)),
                    None => {
                        out.push_str("$(");
                        out.push_str(path);
                        out.push(')');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder, keep the remainder as-is.
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_value() {
        let data = json!({
            "user": {
                "name": "ada",
                "addresses": [{"city": "london"}]
            }
        });

        assert_eq!(get_nested_value(&data, "user.name"), Some(&json!("ada")));
        assert_eq!(
            get_nested_value(&data, "user.addresses.0.city"),
            Some(&json!("london"))
        );
        assert_eq!(get_nested_value(&data, "user.missing"), None);
        assert_eq!(get_nested_value(&data, "user.addresses.7"), None);
        assert_eq!(get_nested_value(&data, ""), Some(&data));
    }

    #[test]
    fn test_format_error_message() {
        let mut inputs = serde_json::Map::new();
        inputs.insert("input1".to_string(), json!({"country": "india", "count": 3}));
        inputs.insert("limit".to_string(), json!(10));

        assert_eq!(
            format_error_message("country $(input1.country) over $(limit)", &inputs),
            "country india over 10"
        );
    }

    #[test]
    fn test_format_error_message_keeps_unresolved_placeholders() {
        let inputs = serde_json::Map::new();
        assert_eq!(
            format_error_message("missing $(nope.x) here", &inputs),
            "missing $(nope.x) here"
        );
    }

    #[test]
    fn test_format_error_message_unterminated() {
        let inputs = serde_json::Map::new();
        assert_eq!(format_error_message("oops $(name", &inputs), "oops $(name");
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("abc")), "abc");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&json!({"a": 1})), "{\"a\":1}");
    }
}
