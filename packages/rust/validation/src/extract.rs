//! Pull a JSON array out of free-form model output.

use serde_json::Value;

/// Bodies of every complete fenced code block in `text`, in order.
///
/// The language tag on each opening line (```` ```json ````, ```` ```python ````,
/// or none) is skipped.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find("```")?;
        let after_fence = &rest[start + 3..];
        let body_start = after_fence.find('\n').map_or(after_fence.len(), |n| n + 1);
        let body = &after_fence[body_start..];
        let end = body.find("```")?;
        rest = &body[end + 3..];
        Some(body[..end].trim())
    })
}

/// Locate the primary JSON payload in `text`.
///
/// The first fenced block wins; otherwise the whole trimmed text is assumed
/// to be JSON.
pub(crate) fn json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    fenced_blocks(trimmed).next().unwrap_or(trimmed)
}

/// Parse the payload as a JSON array.
///
/// Every fenced block is tried in turn and the first JSON array wins. Returns
/// a description of the problem with the primary payload when none is an
/// array; callers treat that as an empty batch.
pub(crate) fn parse_array(text: &str) -> Result<Vec<Value>, String> {
    for block in fenced_blocks(text.trim()) {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(block) {
            return Ok(items);
        }
    }

    let payload = json_payload(text);
    if payload.is_empty() {
        return Err("provider returned no content".into());
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(format!("expected a JSON array, got {}", kind_of(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json() {
        assert_eq!(json_payload("  [1, 2]  "), "[1, 2]");
    }

    #[test]
    fn json_fence_inside_prose() {
        let text = "Here are the scholarships I found:\n```json\n[{\"a\": 1}]\n```\nLet me know!";
        assert_eq!(json_payload(text), "[{\"a\": 1}]");
    }

    #[test]
    fn untagged_fence() {
        let text = "```\n[]\n```";
        assert_eq!(json_payload(text), "[]");
    }

    #[test]
    fn unterminated_fence_falls_back_to_whole_text() {
        let text = "```json\n[1]";
        assert_eq!(json_payload(text), text);
        assert!(parse_array(text).is_err());
    }

    #[test]
    fn prose_without_fence_is_a_parse_failure() {
        let err = parse_array("I could not find any scholarships, sorry.").unwrap_err();
        assert!(err.contains("invalid JSON"));
    }

    #[test]
    fn object_is_not_an_array() {
        let err = parse_array(r#"{"scholarships": []}"#).unwrap_err();
        assert!(err.contains("an object"));
    }

    #[test]
    fn later_fence_is_used_when_the_first_is_not_an_array() {
        let text = "Search plan:\n```text\nscholarships germany 2027\n```\n\
                    Results:\n```json\n[{\"a\": 1}, {\"a\": 2}]\n```";
        let items = parse_array(text).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn json_object_fence_before_array_fence() {
        let text = "```json\n{\"query\": \"x\"}\n```\n```json\n[]\n```";
        assert_eq!(parse_array(text).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn no_array_in_any_fence_reports_first_payload() {
        let text = "```text\nnothing\n```\n```json\n{}\n```";
        let err = parse_array(text).unwrap_err();
        assert!(err.contains("invalid JSON"));
    }

    #[test]
    fn empty_text() {
        assert!(parse_array("   ").is_err());
    }
}
