use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::llm::{int_param, BlockingBridge, Completion, UnifiedRequest};
use crate::registry::{ProviderKind, RegistryEntry};
use crate::usage::TokenUsage;

const KIND: ProviderKind = ProviderKind::ContentsStyle;
const JSON_MIME: &str = "application/json";

// ── Gemini request types ─────────────────────────────────

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiRequest {
    contents:          Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role:  Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature:        Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens:  Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

// ── Gemini response types ────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates:      Vec<GeminiCandidate>,
    usage_metadata:  Option<GeminiUsage>,
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count:     u32,
    #[serde(default)]
    candidates_token_count: u32,
}

// ── Client ───────────────────────────────────────────────

/// Blocking generate-content client. Only ever used from a bridge worker.
#[derive(Clone)]
pub struct GeminiClient {
    http:     reqwest::blocking::Client,
    api_key:  String,
    api_base: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient").field("api_base", &self.api_base).finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub(crate) fn new(http: reqwest::blocking::Client, api_key: String, api_base: String) -> Self {
        Self { http, api_key, api_base }
    }

    fn send(&self, model: &str, body: &GeminiRequest) -> Result<Completion, AgentError> {
        let response = self.http
            .post(format!("{}/models/{}:generateContent", self.api_base, model))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type",   "application/json")
            .json(body)
            .send()
            .map_err(|e| AgentError::provider(KIND, format!("Network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body   = response.text().unwrap_or_default();
            return Err(AgentError::provider(KIND, format!("Gemini API error {status}: {body}")));
        }

        let parsed: GeminiResponse = response.json()
            .map_err(|e| AgentError::provider(KIND, format!("Failed to parse Gemini response: {e}")))?;

        extract(parsed)
    }
}

/// The flattened fragment list: system prompt, every prior turn's content,
/// then the new input. Roles are dropped; order alone carries the dialogue.
pub(crate) fn build_fragments(request: &UnifiedRequest) -> Vec<String> {
    let mut fragments = Vec::with_capacity(request.prior_turns.len() + 2);
    if let Some(system) = request.system() {
        fragments.push(system.to_string());
    }
    fragments.extend(request.conversation_turns().map(|t| t.content.clone()));
    fragments.push(request.new_input.clone());
    fragments
}

pub(crate) fn build_request(entry: &RegistryEntry, request: &UnifiedRequest) -> GeminiRequest {
    let parts = build_fragments(request)
        .into_iter()
        .map(|text| GeminiPart { text: Some(text) })
        .collect();

    GeminiRequest {
        contents: vec![GeminiContent { role: Some("user".to_string()), parts }],
        generation_config: GenerationConfig {
            temperature:        entry.param("temperature"),
            max_output_tokens:  int_param(entry, "max_output_tokens"),
            response_mime_type: request.structured_output.then_some(JSON_MIME),
        },
    }
}

/// Text of the first candidate, parts joined in order.
fn extract(response: GeminiResponse) -> Result<Completion, AgentError> {
    let usage = response.usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count));

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response.prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(AgentError::provider(KIND, format!("Gemini returned no candidates: {reason}")));
    };

    let text: String = candidate.content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(AgentError::provider(KIND, "Gemini returned an empty candidate"));
    }

    Ok(Completion { text, usage })
}

pub(crate) async fn call(
    client:  &GeminiClient,
    bridge:  &BlockingBridge,
    entry:   &RegistryEntry,
    request: &UnifiedRequest,
) -> Result<Completion, AgentError> {
    let body = build_request(entry, request);
    let model = entry.model_id.clone();
    let client = client.clone();
    bridge.run(move || client.send(&model, &body)).await
}
