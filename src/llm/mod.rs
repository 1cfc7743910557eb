use async_trait::async_trait;

use crate::error::AgentError;
use crate::history::{Role, Turn};
use crate::registry::RegistryEntry;
use crate::usage::TokenUsage;

mod anthropic;
mod bridge;
mod gemini;
mod mock;
mod native;
mod openai;

pub use anthropic::AnthropicClient;
pub use bridge::BlockingBridge;
pub use gemini::GeminiClient;
pub use mock::{MockBackend, MockReply};
pub use native::{NativeBackend, ProviderClient};

/// Provider-neutral description of one call, rebuilt from agent state every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedRequest {
    /// Already trimmed; empty means "no system prompt".
    pub system_prompt:     String,
    /// Accumulated history; empty for agents that do not keep history.
    pub prior_turns:       Vec<Turn>,
    pub new_input:         String,
    pub structured_output: bool,
}

impl UnifiedRequest {
    pub fn system(&self) -> Option<&str> {
        if self.system_prompt.is_empty() { None } else { Some(&self.system_prompt) }
    }

    /// Prior user/assistant turns. System turns are skipped: the agent's own
    /// prompt is the only system instruction any backend receives.
    pub fn conversation_turns(&self) -> impl Iterator<Item = &Turn> {
        self.prior_turns.iter().filter(|t| t.role != Role::System)
    }
}

/// Plain text extracted from a backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text:  String,
    pub usage: Option<TokenUsage>,
}

/// The single seam between an [`Agent`](crate::Agent) and whatever answers it.
///
/// # Contract
/// - Suspends the caller until the backend answers; never blocks the
///   scheduler thread.
/// - Returns the reply's plain text, unnormalized.
/// - Maps every backend failure to [`AgentError::ProviderRequest`] (or
///   [`AgentError::Authentication`] when no credential exists) and never
///   retries.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    async fn call(
        &self,
        entry:   &RegistryEntry,
        request: &UnifiedRequest,
    ) -> Result<Completion, AgentError>;
}

/// Integer-valued generation parameter (`max_tokens` and friends).
pub(crate) fn int_param(entry: &RegistryEntry, key: &str) -> Option<u64> {
    entry.param(key)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64)
}
