use std::sync::Arc;

use crate::agent::{Agent, ConcurrencyPolicy};
use crate::config::Settings;
use crate::error::AgentError;
use crate::history::History;
use crate::llm::{NativeBackend, ProviderBackend};
use crate::registry::ModelRegistry;

pub struct AgentBuilder {
    shorthand:         String,
    system_prompt:     String,
    keep_history:      bool,
    structured_output: bool,
    policy:            ConcurrencyPolicy,
    settings:          Option<Settings>,
    backend:           Option<Arc<dyn ProviderBackend>>,
    seed:              Option<History>,
}

impl AgentBuilder {
    pub fn new(shorthand: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            shorthand:         shorthand.into(),
            system_prompt:     system_prompt.into(),
            keep_history:      false,
            structured_output: false,
            policy:            ConcurrencyPolicy::default(),
            settings:          None,
            backend:           None,
            seed:              None,
        }
    }

    /// Keep a running turn log and send it with every call.
    pub fn history(mut self, keep: bool) -> Self {
        self.keep_history = keep; self
    }

    /// Ask the backend for JSON and parse every reply.
    pub fn structured_output(mut self, on: bool) -> Self {
        self.structured_output = on; self
    }

    pub fn concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy; self
    }

    /// Credentials, endpoints, timeout and worker count. Defaults to
    /// [`Settings::default`], which reads credentials from the environment.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings); self
    }

    /// Replace the native backend, e.g. with a [`MockBackend`](crate::llm::MockBackend).
    pub fn backend(mut self, backend: Arc<dyn ProviderBackend>) -> Self {
        self.backend = Some(backend); self
    }

    /// Start from a previously saved history. Requires `history(true)`.
    pub fn history_snapshot(mut self, history: History) -> Self {
        self.seed = Some(history); self
    }

    /// Resolves the shorthand and assembles the agent.
    ///
    /// Fails with `Configuration` for an unknown shorthand, invalid
    /// settings, or a history seed on an agent that keeps no history.
    /// Creates no client and performs no I/O.
    pub fn build(self, registry: &ModelRegistry) -> Result<Agent, AgentError> {
        let entry = registry.resolve(&self.shorthand)?.clone();

        let settings = self.settings.unwrap_or_default();
        settings.validate()?;

        let history = match self.seed {
            Some(seed) if !self.keep_history && !seed.is_empty() => {
                return Err(AgentError::Configuration(format!(
                    "Agent '{}' was given a history snapshot but keeps no history",
                    entry.shorthand
                )));
            }
            // The agent's own prompt replaces any system turn in the seed.
            Some(seed) => History::from_turns(seed.turns().to_vec())?.without_system(),
            None => History::new(),
        };

        let backend: Arc<dyn ProviderBackend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(NativeBackend::new(entry.provider_kind, settings.clone())),
        };

        tracing::debug!(
            shorthand = %entry.shorthand,
            provider  = %entry.provider_kind,
            model     = %entry.model_id,
            "agent built"
        );

        Ok(Agent::from_parts(
            entry,
            &self.system_prompt,
            self.keep_history,
            self.structured_output,
            self.policy,
            &settings,
            backend,
            history,
        ))
    }
}
