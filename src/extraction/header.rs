//! Header extraction and header views used by rules.

use crate::models::{find_header, Header};
use serde_json::{Map, Value};

/// Case-insensitive header lookup; the first header with that name wins.
///
/// # Examples
///
/// ```
/// use rest_client_scripting::extraction::extract_from_header;
/// use rest_client_scripting::models::Header;
///
/// let headers = vec![Header::new("X-Request-Id", "42")];
/// assert_eq!(extract_from_header(&headers, "x-request-id"), Some("42".to_string()));
/// ```
pub fn extract_from_header(headers: &[Header], name: &str) -> Option<String> {
    find_header(headers, name.trim()).map(str::to_string)
}

/// Renders headers as `Name: value` lines, the text regex rules run against.
pub fn headers_as_text(headers: &[Header]) -> String {
    headers
        .iter()
        .map(|h| format!("{}: {}", h.name, h.value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders headers as a JSON object keyed by lowercase name, the document
/// JSONPath rules run against. Repeated headers become arrays.
pub fn headers_as_json(headers: &[Header]) -> Value {
    let mut map = Map::new();
    for header in headers {
        let key = header.name.to_ascii_lowercase();
        let value = Value::String(header.value.clone());
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers() -> Vec<Header> {
        vec![
            Header::new("Content-Type", "application/json"),
            Header::new("Set-Cookie", "a=1"),
            Header::new("set-cookie", "b=2"),
        ]
    }

    #[test]
    fn test_case_insensitive_lookup() {
        assert_eq!(
            extract_from_header(&headers(), "CONTENT-TYPE").as_deref(),
            Some("application/json")
        );
        assert_eq!(extract_from_header(&headers(), "Set-Cookie").as_deref(), Some("a=1"));
        assert_eq!(extract_from_header(&headers(), "Missing"), None);
    }

    #[test]
    fn test_headers_as_text() {
        let text = headers_as_text(&headers());
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("Content-Type: application/json\n"));
    }

    #[test]
    fn test_headers_as_json_groups_repeats() {
        let doc = headers_as_json(&headers());
        assert_eq!(doc["content-type"], json!("application/json"));
        assert_eq!(doc["set-cookie"], json!(["a=1", "b=2"]));
    }
}
