use std::collections::HashMap;
use std::time::Duration;

use crate::error::AgentError;
use crate::registry::ProviderKind;
use crate::trace::DEFAULT_TRACE_CAPACITY;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_BLOCKING_WORKERS: usize = 8;

const TIMEOUT_VAR: &str = "AGENTRELAY_TIMEOUT_SECS";
const WORKERS_VAR: &str = "AGENTRELAY_BLOCKING_WORKERS";
const TRACE_VAR: &str = "AGENTRELAY_TRACE_CAPACITY";

/// Runtime settings shared by an agent's backend.
///
/// Credentials and base URLs are resolved lazily, at first client creation.
/// Explicit values set with [`Settings::with_api_key`] and
/// [`Settings::with_base_url`] win over the environment; an isolated
/// instance never reads the environment at all.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Upper bound on a single backend call, including time queued for a worker.
    pub request_timeout:  Duration,
    /// Worker-thread slots available to blocking backends, per agent.
    pub blocking_workers: usize,
    /// Call records an agent keeps before evicting the oldest.
    pub trace_capacity:   usize,
    base_urls:            HashMap<ProviderKind, String>,
    api_keys:             HashMap<ProviderKind, String>,
    read_env:             bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout:  DEFAULT_REQUEST_TIMEOUT,
            blocking_workers: DEFAULT_BLOCKING_WORKERS,
            trace_capacity:   DEFAULT_TRACE_CAPACITY,
            base_urls:        HashMap::new(),
            api_keys:         HashMap::new(),
            read_env:         true,
        }
    }
}

impl Settings {
    /// Defaults, with timeout, worker count and trace capacity taken from
    /// `AGENTRELAY_TIMEOUT_SECS`, `AGENTRELAY_BLOCKING_WORKERS` and
    /// `AGENTRELAY_TRACE_CAPACITY` when set.
    pub fn from_env() -> Result<Self, AgentError> {
        let mut settings = Self::default();
        if let Some(secs) = env_number(TIMEOUT_VAR)? {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = env_number(WORKERS_VAR)? {
            settings.blocking_workers = workers as usize;
        }
        if let Some(capacity) = env_number(TRACE_VAR)? {
            settings.trace_capacity = capacity as usize;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Settings that ignore the process environment entirely.
    pub fn isolated() -> Self {
        Self { read_env: false, ..Self::default() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout; self
    }

    pub fn with_blocking_workers(mut self, workers: usize) -> Self {
        self.blocking_workers = workers; self
    }

    pub fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity; self
    }

    pub fn with_base_url(mut self, kind: ProviderKind, url: impl Into<String>) -> Self {
        self.base_urls.insert(kind, url.into()); self
    }

    pub fn with_api_key(mut self, kind: ProviderKind, key: impl Into<String>) -> Self {
        self.api_keys.insert(kind, key.into()); self
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.request_timeout.is_zero() {
            return Err(AgentError::Configuration("request timeout must be non-zero".to_string()));
        }
        if self.blocking_workers == 0 {
            return Err(AgentError::Configuration("blocking worker count must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Base URL for `kind`, without a trailing slash.
    pub fn base_url(&self, kind: ProviderKind) -> String {
        let url = self.base_urls.get(&kind).cloned()
            .or_else(|| self.env(kind.base_url_var()))
            .unwrap_or_else(|| kind.default_base_url().to_string());
        url.trim_end_matches('/').to_string()
    }

    /// Credential for `kind`. Fails before any network I/O when none is found.
    pub fn api_key(&self, kind: ProviderKind) -> Result<String, AgentError> {
        if let Some(key) = self.api_keys.get(&kind).filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }

        kind.credential_vars()
            .iter()
            .find_map(|var| self.env(var))
            .ok_or_else(|| AgentError::Authentication {
                provider: kind,
                detail:   format!("no credential found (checked {})", kind.credential_vars().join(", ")),
            })
    }

    fn env(&self, var: &str) -> Option<String> {
        if !self.read_env {
            return None;
        }
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }
}

fn env_number(var: &str) -> Result<Option<u64>, AgentError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
            AgentError::Configuration(format!("{var}={raw:?} is not a number: {e}"))
        }),
        Err(_) => Ok(None),
    }
}
