use std::time::Duration;
use thiserror::Error;

use crate::registry::ProviderKind;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Unknown shorthand, invalid registry, or invalid agent setup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No usable credential for the provider kind being dispatched to.
    #[error("Authentication error for {provider}: {detail}")]
    Authentication { provider: ProviderKind, detail: String },

    /// The backend call itself failed. `detail` carries the backend's message.
    #[error("{provider} request failed: {detail}")]
    ProviderRequest { provider: ProviderKind, detail: String },

    /// Structured output was requested but the reply could not be parsed.
    #[error("Response format error: {0}")]
    ResponseFormat(String),

    /// Another call is already in flight on an agent that rejects concurrent callers.
    #[error("Agent '{0}' already has a call in flight")]
    Concurrency(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,
}

impl AgentError {
    pub(crate) fn provider(provider: ProviderKind, detail: impl std::fmt::Display) -> Self {
        Self::ProviderRequest { provider, detail: detail.to_string() }
    }
}
