//! Recovery of JSON payloads from model replies.
//!
//! Backends asked for JSON sometimes wrap it in a markdown fence anyway.
//! [`normalize`] strips the first fenced block, if any, and parses what is
//! inside; otherwise it parses the whole reply. This is best-effort: prose
//! around an unfenced payload is not handled and surfaces as
//! [`AgentError::ResponseFormat`].

use serde_json::Value;

use crate::error::AgentError;

const FENCE: &str = "```";

/// Parses `raw` as JSON after stripping one layer of markdown fencing.
///
/// Only syntactic validity is guaranteed. Call sites that depend on a
/// particular shape check it themselves, e.g. with [`require_keys`].
pub fn normalize(raw: &str) -> Result<Value, AgentError> {
    let candidate = extract_fenced(raw).unwrap_or(raw).trim();

    if candidate.is_empty() {
        return Err(AgentError::ResponseFormat("empty structured payload".to_string()));
    }

    serde_json::from_str(candidate)
        .map_err(|e| AgentError::ResponseFormat(format!("invalid JSON payload: {e}")))
}

/// Interior of the first fenced block in `text`.
///
/// The opening fence is the first line that starts with three backticks
/// (an info string such as `json` may follow on that line). The block ends
/// at the next line consisting of three backticks alone. An opening fence
/// without a closing one does not count as a block.
pub fn extract_fenced(text: &str) -> Option<&str> {
    let mut offset = 0;
    let mut interior_start = None;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        match interior_start {
            None if line.trim_start().starts_with(FENCE) => interior_start = Some(offset),
            Some(start) if line.trim() == FENCE => return Some(&text[start..line_start]),
            _ => {}
        }
    }

    None
}

/// Fails unless `value` is an object carrying every key in `keys`.
pub fn require_keys(value: &Value, keys: &[&str]) -> Result<(), AgentError> {
    let object = value.as_object().ok_or_else(|| {
        AgentError::ResponseFormat(format!("expected a JSON object, got {}", kind_of(value)))
    })?;

    let missing: Vec<&str> = keys.iter().copied().filter(|k| !object.contains_key(*k)).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AgentError::ResponseFormat(format!("missing keys: {}", missing.join(", "))))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_)  => "an array",
        Value::Object(_) => "an object",
    }
}
