use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::builder::AgentBuilder;
use crate::config::Settings;
use crate::error::AgentError;
use crate::history::History;
use crate::llm::{ProviderBackend, UnifiedRequest};
use crate::normalize::normalize;
use crate::registry::{ModelRegistry, ProviderKind, RegistryEntry};
use crate::trace::{CallOutcome, CallRecord, Trace};
use crate::usage::TokenUsage;

/// What happens when `respond` is called on a historied agent while another
/// call on it is still in flight. Agents without history never wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Wait for the earlier call to finish; calls run in arrival order.
    #[default]
    Queue,
    /// Fail immediately with [`AgentError::Concurrency`].
    Reject,
}

/// What `respond` hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    /// Parsed payload of an agent in structured-output mode.
    Structured(Value),
}

impl Reply {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            Reply::Structured(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Reply::Text(_) => None,
            Reply::Structured(value) => Some(value),
        }
    }

    /// The reply as text; structured payloads are re-serialized compactly.
    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::Structured(value) => value.to_string(),
        }
    }
}

/// Everything a completed call may change, behind one short-lived lock.
#[derive(Debug, Default)]
struct Conversation {
    history: History,
    usage:   TokenUsage,
    trace:   Trace,
}

/// A conversational role bound to one registry entry.
///
/// Built once per role (evaluator, hint generator, ...) and shared by
/// reference for the life of the application. Calls on a historied agent
/// are serialized, so the history always alternates user/assistant in the
/// order calls completed, and a failed call leaves it untouched. Calls on
/// an agent without history run concurrently.
pub struct Agent {
    entry:             RegistryEntry,
    system_prompt:     String,
    keep_history:      bool,
    structured_output: bool,
    policy:            ConcurrencyPolicy,
    timeout:           Duration,
    backend:           Arc<dyn ProviderBackend>,
    /// Held for the whole of a call.
    in_flight:         tokio::sync::Mutex<()>,
    conversation:      Mutex<Conversation>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("shorthand", &self.entry.shorthand)
            .field("provider", &self.entry.provider_kind)
            .field("model_id", &self.entry.model_id)
            .field("keep_history", &self.keep_history)
            .field("structured_output", &self.structured_output)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Resolves `shorthand` and builds an agent with default settings.
    /// No client is created and no I/O happens until the first call.
    pub fn new(
        registry:          &ModelRegistry,
        shorthand:         &str,
        system_prompt:     &str,
        keep_history:      bool,
        structured_output: bool,
    ) -> Result<Self, AgentError> {
        AgentBuilder::new(shorthand, system_prompt)
            .history(keep_history)
            .structured_output(structured_output)
            .build(registry)
    }

    pub fn builder(shorthand: impl Into<String>, system_prompt: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(shorthand, system_prompt)
    }

    pub(crate) fn from_parts(
        entry:             RegistryEntry,
        system_prompt:     &str,
        keep_history:      bool,
        structured_output: bool,
        policy:            ConcurrencyPolicy,
        settings:          &Settings,
        backend:           Arc<dyn ProviderBackend>,
        history:           History,
    ) -> Self {
        Self {
            entry,
            system_prompt: system_prompt.trim().to_string(),
            keep_history,
            structured_output,
            policy,
            timeout: settings.request_timeout,
            backend,
            in_flight: tokio::sync::Mutex::new(()),
            conversation: Mutex::new(Conversation {
                history,
                usage: TokenUsage::default(),
                trace: Trace::with_capacity(settings.trace_capacity),
            }),
        }
    }

    // ── Calls ───────────────────────────────────────────────

    /// Sends `input` and returns the reply.
    ///
    /// On success a historied agent records the exchange. On any error the
    /// history is exactly as it was before the call.
    pub async fn respond(&self, input: &str) -> Result<Reply, AgentError> {
        self.respond_with_cancel(input, &CancellationToken::new()).await
    }

    /// [`Agent::respond`] with a caller-side abort path.
    ///
    /// Cancelling, or hitting the configured timeout, abandons the call with
    /// the history untouched. A blocking backend still finishes the request
    /// on its worker; the answer is discarded.
    pub async fn respond_with_cancel(
        &self,
        input:  &str,
        cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        self.call(input, cancel, |text| self.shape(text)).await
    }

    /// Returns the reply as text, whatever the agent's mode.
    pub async fn respond_text(&self, input: &str) -> Result<String, AgentError> {
        self.respond(input).await.map(Reply::into_text)
    }

    /// Deserializes the structured reply into `T`.
    ///
    /// Only for agents in structured-output mode. A payload that does not
    /// fit `T` fails with `ResponseFormat` and, like any other failure,
    /// leaves the history untouched.
    pub async fn respond_json<T: DeserializeOwned>(&self, input: &str) -> Result<T, AgentError> {
        if !self.structured_output {
            return Err(AgentError::Configuration(format!(
                "Agent '{}' is not in structured-output mode", self.entry.shorthand
            )));
        }

        self.call(input, &CancellationToken::new(), |text| {
            serde_json::from_value(normalize(text)?)
                .map_err(|e| AgentError::ResponseFormat(format!("unexpected payload shape: {e}")))
        })
        .await
    }

    /// Runs one exchange under cancellation, then logs and traces it.
    async fn call<T, F>(&self, input: &str, cancel: &CancellationToken, decode: F) -> Result<T, AgentError>
    where
        F: FnOnce(&str) -> Result<T, AgentError>,
    {
        let started_at = Utc::now();
        let clock = Instant::now();

        tracing::info!(
            shorthand = %self.entry.shorthand,
            provider  = %self.entry.provider_kind,
            model     = %self.entry.model_id,
            "agent call"
        );

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            outcome = self.exchange(input, decode) => outcome,
        };

        // A rejected caller never reached the backend; nothing to record.
        if matches!(result, Err(AgentError::Concurrency(_))) {
            tracing::warn!(shorthand = %self.entry.shorthand, "rejected concurrent call");
            return result;
        }

        let outcome = match &result {
            Ok(_) => {
                tracing::debug!(shorthand = %self.entry.shorthand, "agent call succeeded");
                CallOutcome::Success
            }
            Err(e) => {
                tracing::warn!(shorthand = %self.entry.shorthand, error = %e, "agent call failed");
                CallOutcome::Failure(e.to_string())
            }
        };
        self.conversation().trace.record(CallRecord {
            shorthand:  self.entry.shorthand.clone(),
            provider:   self.entry.provider_kind,
            model_id:   self.entry.model_id.clone(),
            started_at,
            latency_ms: clock.elapsed().as_millis() as u64,
            outcome,
        });

        result
    }

    /// One call: build the request from current state, dispatch under the
    /// timeout, decode the reply, and only then record the exchange.
    ///
    /// Historied agents hold the in-flight gate throughout, so the request
    /// they send and the pair they append belong to the same history.
    /// Agents without history share nothing between calls and never wait.
    async fn exchange<T, F>(&self, input: &str, decode: F) -> Result<T, AgentError>
    where
        F: FnOnce(&str) -> Result<T, AgentError>,
    {
        let _in_flight = if self.keep_history {
            Some(match self.policy {
                ConcurrencyPolicy::Queue => self.in_flight.lock().await,
                ConcurrencyPolicy::Reject => self.in_flight
                    .try_lock()
                    .map_err(|_| AgentError::Concurrency(self.entry.shorthand.clone()))?,
            })
        } else {
            None
        };

        let request = UnifiedRequest {
            system_prompt:     self.system_prompt.clone(),
            prior_turns:       if self.keep_history {
                self.conversation().history.turns().to_vec()
            } else {
                Vec::new()
            },
            new_input:         input.to_string(),
            structured_output: self.structured_output,
        };

        tracing::debug!(
            shorthand   = %self.entry.shorthand,
            prior_turns = request.prior_turns.len(),
            structured  = request.structured_output,
            "dispatching request"
        );

        // The clock starts once the gate is held: time spent queued behind
        // earlier calls is not charged to this one.
        let completion = tokio::time::timeout(self.timeout, self.backend.call(&self.entry, &request))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout))??;

        let decoded = decode(&completion.text)?;

        let mut conversation = self.conversation();
        if self.keep_history {
            conversation.history.push_exchange(input, completion.text);
        }
        if let Some(usage) = completion.usage {
            conversation.usage.add(usage);
        }

        Ok(decoded)
    }

    fn shape(&self, text: &str) -> Result<Reply, AgentError> {
        if self.structured_output {
            normalize(text).map(Reply::Structured)
        } else {
            Ok(Reply::Text(text.to_string()))
        }
    }

    fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── State ───────────────────────────────────────────────

    pub fn shorthand(&self) -> &str {
        &self.entry.shorthand
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.entry.provider_kind
    }

    pub fn model_id(&self) -> &str {
        &self.entry.model_id
    }

    pub fn entry(&self) -> &RegistryEntry {
        &self.entry
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn keeps_history(&self) -> bool {
        self.keep_history
    }

    pub fn structured_output(&self) -> bool {
        self.structured_output
    }

    pub fn concurrency_policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Snapshot of the turn log.
    pub fn history(&self) -> History {
        self.conversation().history.clone()
    }

    /// Token usage summed over every successful call that reported it.
    pub fn usage(&self) -> TokenUsage {
        self.conversation().usage
    }

    /// Snapshot of the most recent call records.
    pub fn trace(&self) -> Trace {
        self.conversation().trace.clone()
    }

    /// Drains the call records, e.g. for periodic export.
    pub fn take_trace(&self) -> Trace {
        self.conversation().trace.take()
    }

    /// Drops all recorded turns, waiting for any in-flight call first.
    pub async fn clear_history(&self) {
        let _in_flight = self.in_flight.lock().await;
        self.conversation().history.clear();
    }
}
