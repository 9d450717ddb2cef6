//! Caption response salvage.
//!
//! The service is prompted to emit strict JSON but is not trusted to comply.
//! [`normalize`] extracts the best JSON object it can from the raw text and
//! always returns something writable; the worst case is an error envelope
//! carrying the raw text, never a panic or an error.

use serde_json::{Map, Value};

/// Marker stored under the `error` key when the payload could not be parsed.
const PARSE_FAILED: &str = "JSON parse failed";

/// Extract a JSON object from a possibly malformed caption payload.
///
/// Strips a surrounding markdown code fence if present, then parses the
/// substring between the first `{` and the last `}`. Anything that fails to
/// yield a JSON object falls back to
/// `{"caption": <text>, "error": "JSON parse failed"}`.
pub fn normalize(raw: &str) -> Map<String, Value> {
    let text = strip_code_fence(raw.trim());

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(map)) = serde_json::from_str(&text[start..=end]) {
                return map;
            }
        }
    }

    let mut fallback = Map::new();
    fallback.insert("caption".to_string(), Value::String(text.to_string()));
    fallback.insert("error".to_string(), Value::String(PARSE_FAILED.to_string()));
    fallback
}

/// Remove a leading/trailing markdown fence (```json or bare ```).
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop the rest of the opening fence line (e.g. the "json" language tag).
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    body.trim_end()
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_valid_json() {
        let result = normalize("```json\n{\"a\":1}\n```");
        assert_eq!(Value::Object(result), json!({"a": 1}));
    }

    #[test]
    fn test_bare_fence() {
        let result = normalize("```\n{\"caption\": \"snowy road\"}\n```");
        assert_eq!(result["caption"], "snowy road");
        assert!(!result.contains_key("error"));
    }

    #[test]
    fn test_plain_json() {
        let result = normalize(r#"{"weather": {"winter weather": true}}"#);
        assert_eq!(result["weather"]["winter weather"], true);
    }

    #[test]
    fn test_json_with_leading_chatter() {
        let result = normalize("Here is the result:\n{\"caption\": \"a truck\"} hope that helps");
        assert_eq!(result["caption"], "a truck");
    }

    #[test]
    fn test_no_braces_falls_back() {
        let result = normalize("no braces here");
        assert_eq!(result["caption"], "no braces here");
        assert_eq!(result["error"], PARSE_FAILED);
    }

    #[test]
    fn test_fenced_invalid_json_falls_back() {
        let result = normalize("```json\n{\"a\": oops}\n```");
        assert_eq!(result["error"], PARSE_FAILED);
        assert_eq!(result["caption"], "{\"a\": oops}");
    }

    #[test]
    fn test_non_object_json_falls_back() {
        // A bare array parses but is not an object we can merge metadata into.
        let result = normalize("[1, 2, 3]");
        assert_eq!(result["error"], PARSE_FAILED);
    }

    #[test]
    fn test_empty_input() {
        let result = normalize("");
        assert_eq!(result["caption"], "");
        assert_eq!(result["error"], PARSE_FAILED);
    }

    #[test]
    fn test_reversed_braces() {
        let result = normalize("} backwards {");
        assert_eq!(result["error"], PARSE_FAILED);
    }
}

// ---------------------------------------------------------------------------
// Property-based tests
// ---------------------------------------------------------------------------
