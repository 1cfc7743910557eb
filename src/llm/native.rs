use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::Settings;
use crate::error::AgentError;
use crate::llm::anthropic::{self, AnthropicClient};
use crate::llm::gemini::{self, GeminiClient};
use crate::llm::{openai, BlockingBridge, Completion, ProviderBackend, UnifiedRequest};
use crate::registry::{ProviderKind, RegistryEntry};

/// A connected client, one variant per provider kind.
#[derive(Debug)]
pub enum ProviderClient {
    Chat(Client<OpenAIConfig>),
    Messages(AnthropicClient),
    Contents(GeminiClient),
}

impl ProviderClient {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderClient::Chat(_)     => ProviderKind::ChatStyle,
            ProviderClient::Messages(_) => ProviderKind::MessagesStyle,
            ProviderClient::Contents(_) => ProviderKind::ContentsStyle,
        }
    }

    /// Resolves the credential and builds the client. Fails with
    /// `Authentication` before any network traffic when no key is configured.
    async fn connect(
        kind:     ProviderKind,
        settings: &Settings,
        bridge:   &BlockingBridge,
    ) -> Result<Self, AgentError> {
        let api_key  = settings.api_key(kind)?;
        let api_base = settings.base_url(kind);
        tracing::debug!(provider = %kind, api_base = %api_base, "creating provider client");

        match kind {
            ProviderKind::ChatStyle => Ok(Self::Chat(openai::connect(api_key, api_base))),
            ProviderKind::MessagesStyle => {
                let http = blocking_http(kind, settings.request_timeout, bridge).await?;
                Ok(Self::Messages(AnthropicClient::new(http, api_key, api_base)))
            }
            ProviderKind::ContentsStyle => {
                let http = blocking_http(kind, settings.request_timeout, bridge).await?;
                Ok(Self::Contents(GeminiClient::new(http, api_key, api_base)))
            }
        }
    }
}

/// The blocking HTTP client spins up its own runtime thread, so it is built
/// on a bridge worker rather than on the scheduler.
async fn blocking_http(
    kind:    ProviderKind,
    timeout: Duration,
    bridge:  &BlockingBridge,
) -> Result<reqwest::blocking::Client, AgentError> {
    bridge.run(move || {
        reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::provider(kind, format!("Failed to build HTTP client: {e}")))
    }).await
}

/// The real backend: lazily connects once, then dispatches every call to
/// the adapter for its provider kind.
pub struct NativeBackend {
    kind:     ProviderKind,
    settings: Settings,
    bridge:   BlockingBridge,
    client:   OnceCell<ProviderClient>,
}

impl NativeBackend {
    pub fn new(kind: ProviderKind, settings: Settings) -> Self {
        let bridge = BlockingBridge::new(settings.blocking_workers);
        Self {
            kind,
            settings,
            bridge,
            client: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Whether the client has been created yet.
    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    pub fn bridge(&self) -> &BlockingBridge {
        &self.bridge
    }

    /// Concurrent first calls race on the cell; exactly one builds the client.
    async fn client(&self) -> Result<&ProviderClient, AgentError> {
        self.client
            .get_or_try_init(|| ProviderClient::connect(self.kind, &self.settings, &self.bridge))
            .await
    }
}

#[async_trait]
impl ProviderBackend for NativeBackend {
    async fn call(
        &self,
        entry:   &RegistryEntry,
        request: &UnifiedRequest,
    ) -> Result<Completion, AgentError> {
        if entry.provider_kind != self.kind {
            return Err(AgentError::Configuration(format!(
                "'{}' is {} but this backend speaks {}",
                entry.shorthand, entry.provider_kind, self.kind
            )));
        }

        match self.client().await? {
            ProviderClient::Chat(client) => openai::call(client, entry, request).await,
            ProviderClient::Messages(client) => anthropic::call(client, &self.bridge, entry, request).await,
            ProviderClient::Contents(client) => gemini::call(client, &self.bridge, entry, request).await,
        }
    }
}
