use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::llm::{int_param, BlockingBridge, Completion, UnifiedRequest};
use crate::registry::{ProviderKind, RegistryEntry};
use crate::usage::TokenUsage;

const KIND: ProviderKind = ProviderKind::MessagesStyle;
const API_VERSION: &str = "2023-06-01";
/// The messages API requires an output cap on every request.
const DEFAULT_MAX_TOKENS: u64 = 1024;

// ── Anthropic request types ──────────────────────────────

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct AnthropicRequest {
    model:       String,
    max_tokens:  u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system:      Option<String>,
    messages:    Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
struct AnthropicMessage {
    role:    &'static str,
    content: String,
}

// ── Anthropic response types ─────────────────────────────

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage:   Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens:  u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

// ── Client ───────────────────────────────────────────────

/// Blocking messages-API client. Only ever used from a bridge worker.
#[derive(Clone)]
pub struct AnthropicClient {
    http:     reqwest::blocking::Client,
    api_key:  String,
    api_base: String,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient").field("api_base", &self.api_base).finish_non_exhaustive()
    }
}

impl AnthropicClient {
    pub(crate) fn new(http: reqwest::blocking::Client, api_key: String, api_base: String) -> Self {
        Self { http, api_key, api_base }
    }

    fn send(&self, body: &AnthropicRequest) -> Result<Completion, AgentError> {
        let response = self.http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key",         &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type",      "application/json")
            .json(body)
            .send()
            .map_err(|e| AgentError::provider(KIND, format!("Network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body   = response.text().unwrap_or_default();
            return Err(AgentError::provider(KIND, format!("Anthropic API error {status}: {body}")));
        }

        let parsed: AnthropicResponse = response.json()
            .map_err(|e| AgentError::provider(KIND, format!("Failed to parse Anthropic response: {e}")))?;

        extract(parsed)
    }
}

/// Turns go into `messages`; the system prompt is a separate top-level field.
/// There is no JSON switch on this API: structured output relies on the
/// prompt and on normalization afterwards.
pub(crate) fn build_request(entry: &RegistryEntry, request: &UnifiedRequest) -> AnthropicRequest {
    let mut messages: Vec<AnthropicMessage> = request.conversation_turns()
        .map(|t| AnthropicMessage { role: t.role.as_str(), content: t.content.clone() })
        .collect();
    messages.push(AnthropicMessage { role: "user", content: request.new_input.clone() });

    AnthropicRequest {
        model:       entry.model_id.clone(),
        max_tokens:  int_param(entry, "max_tokens").unwrap_or(DEFAULT_MAX_TOKENS),
        system:      request.system().map(str::to_string),
        messages,
        temperature: entry.param("temperature"),
    }
}

/// Concatenates every text block, in order.
fn extract(response: AnthropicResponse) -> Result<Completion, AgentError> {
    let mut text = String::new();
    let mut saw_text = false;
    for block in response.content {
        if let AnthropicContentBlock::Text { text: segment } = block {
            text.push_str(&segment);
            saw_text = true;
        }
    }

    if !saw_text {
        return Err(AgentError::provider(KIND, "Anthropic returned no text content"));
    }

    Ok(Completion {
        text,
        usage: response.usage.map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
    })
}

pub(crate) async fn call(
    client:  &AnthropicClient,
    bridge:  &BlockingBridge,
    entry:   &RegistryEntry,
    request: &UnifiedRequest,
) -> Result<Completion, AgentError> {
    let body = build_request(entry, request);
    if request.structured_output {
        tracing::debug!(model = %entry.model_id, "messages-style backend has no JSON switch; relying on prompt");
    }

    let client = client.clone();
    bridge.run(move || client.send(&body)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Turn;
    use serde_json::json;

    fn entry() -> RegistryEntry {
        RegistryEntry::new("haiku", KIND, "claude-3-5-haiku-20241022")
            .with_param("temperature", 0.7)
    }

    #[test]
    fn system_prompt_is_a_top_level_field() {
        let request = UnifiedRequest {
            system_prompt:     "Be kind.".to_string(),
            prior_turns:       vec![Turn::system("old prompt"), Turn::user("hi"), Turn::assistant("hello")],
            new_input:         "again".to_string(),
            structured_output: false,
        };

        let body = serde_json::to_value(build_request(&entry(), &request)).unwrap();
        assert_eq!(body, json!({
            "model": "claude-3-5-haiku-20241022",
            "max_tokens": 1024,
            "system": "Be kind.",
            "temperature": 0.7,
            "messages": [
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" },
                { "role": "user", "content": "again" },
            ],
        }));
    }

    #[test]
    fn empty_system_prompt_is_not_sent() {
        let request = UnifiedRequest {
            system_prompt:     String::new(),
            prior_turns:       Vec::new(),
            new_input:         "q".to_string(),
            structured_output: true,
        };
        let body = serde_json::to_value(build_request(&entry(), &request)).unwrap();
        assert!(body.get("system").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn text_blocks_are_concatenated_in_order() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "{\"a\":" },
                { "type": "tool_use", "id": "t1", "name": "x", "input": {} },
                { "type": "text", "text": "1}" },
            ],
            "usage": { "input_tokens": 7, "output_tokens": 3 },
        })).unwrap();

        let completion = extract(response).unwrap();
        assert_eq!(completion.text, "{\"a\":1}");
        assert_eq!(completion.usage, Some(TokenUsage::new(7, 3)));
    }

    #[test]
    fn no_text_blocks_is_an_error() {
        let response: AnthropicResponse = serde_json::from_value(json!({ "content": [] })).unwrap();
        assert!(matches!(extract(response), Err(AgentError::ProviderRequest { .. })));
    }
}
