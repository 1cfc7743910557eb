use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::AgentError;
use crate::llm::{Completion, ProviderBackend, UnifiedRequest};
use crate::registry::RegistryEntry;
use crate::usage::TokenUsage;

/// One programmed answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Surfaces as `ProviderRequest` for the entry's provider kind.
    Fail(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self { Self::Text(text.into()) }
    pub fn fail(detail: impl Into<String>) -> Self { Self::Fail(detail.into()) }
}

/// Scripted backend for tests: answers from a queue and records every request.
pub struct MockBackend {
    replies:  Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<UnifiedRequest>>,
    delay:    Option<Duration>,
    usage:    Option<TokenUsage>,
}

impl MockBackend {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies:  Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            delay:    None,
            usage:    None,
        }
    }

    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| MockReply::Text(t.into())).collect())
    }

    /// Sleep this long before answering, to keep a call in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay); self
    }

    /// Report this usage on every successful answer.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage); self
    }

    /// Returns the number of times call() was invoked
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns the request passed to the Nth call (0-indexed)
    pub fn request(&self, n: usize) -> Option<UnifiedRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).get(n).cloned()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ProviderBackend for MockBackend {
    async fn call(
        &self,
        entry:   &RegistryEntry,
        request: &UnifiedRequest,
    ) -> Result<Completion, AgentError> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(MockReply::Text(text)) => Ok(Completion { text, usage: self.usage }),
            Some(MockReply::Fail(detail)) => Err(AgentError::provider(entry.provider_kind, detail)),
            None => Err(AgentError::provider(
                entry.provider_kind,
                "MockBackend: no more programmed replies",
            )),
        }
    }
}
