//! Tolerant JSON extraction from model output

use serde_json::Value;

use crate::error::{Error, Result};

/// Parse `text` as JSON, falling back to the outermost `{...}` or `[...]` block.
///
/// Markdown code fences around the payload are ignored.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = strip_fences(text.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    tracing::warn!("Initial JSON parse failed, attempting block extraction");

    let block = outermost_block(trimmed)
        .ok_or_else(|| Error::JsonParsing("No JSON structure found in response".to_string()))?;

    serde_json::from_str(block).map_err(|e| {
        tracing::error!("Failed to parse extracted JSON: {}", e);
        Error::JsonParsing(format!("Failed to parse JSON: {}", e))
    })
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string (```json)
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Slice from the first opening brace or bracket to the last matching closer
fn outermost_block(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(extract_json("[1, 2]").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_embedded_in_prose() {
        let text = "Ecco il risultato:\n{\n  \"client\": \"ACME\",\n  \"nested\": {\"x\": 1}\n}\nFine.";
        assert_eq!(
            extract_json(text).unwrap(),
            json!({"client": "ACME", "nested": {"x": 1}})
        );
    }

    #[test]
    fn test_fenced_array() {
        let text = "```json\n[{\"section\": \"commento\"}]\n```";
        assert_eq!(extract_json(text).unwrap(), json!([{"section": "commento"}]));
    }

    #[test]
    fn test_missing_structure() {
        let err = extract_json("nessun json qui").unwrap_err();
        assert!(matches!(err, Error::JsonParsing(ref m) if m.contains("No JSON structure")));
    }

    #[test]
    fn test_malformed_block() {
        let err = extract_json("prefix {\"a\": } suffix").unwrap_err();
        assert!(matches!(err, Error::JsonParsing(ref m) if m.starts_with("Failed to parse JSON")));
    }
}
