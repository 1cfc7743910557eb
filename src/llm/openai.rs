use async_openai::{
    config::OpenAIConfig,
    types::CreateChatCompletionRequest,
    Client,
};
use backoff::ExponentialBackoff;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::AgentError;
use crate::llm::{int_param, Completion, UnifiedRequest};
use crate::registry::{ProviderKind, RegistryEntry};
use crate::usage::TokenUsage;

const KIND: ProviderKind = ProviderKind::ChatStyle;

/// Natively async client; calls on it bypass the blocking bridge.
pub(crate) fn connect(api_key: String, api_base: String) -> Client<OpenAIConfig> {
    let config = OpenAIConfig::new()
        .with_api_base(api_base)
        .with_api_key(api_key);
    Client::with_config(config).with_backoff(no_retry())
}

/// async-openai retries 429 and 5xx on its own; a zero elapsed-time budget
/// turns every first failure into the final one.
pub(crate) fn no_retry() -> ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// Flat role/content list: system first, then history, then the new input.
pub(crate) fn build_messages(request: &UnifiedRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.prior_turns.len() + 2);

    if let Some(system) = request.system() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for turn in request.conversation_turns() {
        messages.push(json!({ "role": turn.role.as_str(), "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": request.new_input }));

    messages
}

/// The chat-completions body as JSON. Structured output uses the native
/// `response_format` switch.
pub(crate) fn build_body(entry: &RegistryEntry, request: &UnifiedRequest) -> Value {
    let mut body = json!({
        "model":    entry.model_id,
        "messages": build_messages(request),
    });

    if let Some(temperature) = entry.param("temperature") {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = int_param(entry, "max_tokens") {
        body["max_tokens"] = json!(max_tokens);
    }
    if request.structured_output {
        body["response_format"] = json!({ "type": "json_object" });
    }

    body
}

pub(crate) async fn call(
    client:  &Client<OpenAIConfig>,
    entry:   &RegistryEntry,
    request: &UnifiedRequest,
) -> Result<Completion, AgentError> {
    // Typed request via serde round-trip, so the wire shape lives in one place.
    let typed: CreateChatCompletionRequest = serde_json::from_value(build_body(entry, request))
        .map_err(|e| AgentError::provider(KIND, format!("Failed to build request: {e}")))?;

    let response = client.chat()
        .create(typed)
        .await
        .map_err(|e| AgentError::provider(KIND, format!("OpenAI API error: {e}")))?;

    let usage = response.usage.map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

    let choice = response.choices.into_iter().next()
        .ok_or_else(|| AgentError::provider(KIND, "Empty response from OpenAI"))?;

    let text = choice.message.content
        .ok_or_else(|| AgentError::provider(KIND, "No content in OpenAI response"))?;

    Ok(Completion { text, usage })
}
