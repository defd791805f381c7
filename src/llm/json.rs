//! Best-effort recovery of a JSON object from free-form model output.
//!
//! Models wrap their answers in Markdown fences, prepend chatter, or stop
//! half way through. These helpers only do string surgery; deciding what a
//! failure means is left to the caller.

use serde_json::Value;

/// Removes ```` ```json ```` / ```` ``` ```` markers anywhere in the text and trims it.
pub fn strip_code_fences(text: &str) -> String {
    text.trim().replace("```json", "").replace("```", "").trim().to_string()
}

/// Slice between the first `{` and the last `}`, inclusive.
pub fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses the outermost `{ ... }` span as JSON. `None` on any failure.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(object_span(text)?) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
