use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::AgentError;

/// Which native calling convention a backend speaks.
///
/// The set is closed: every dispatch site matches on it exhaustively, so
/// adding a backend is a compile error everywhere it has to be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Flat role/content message list, system prompt as the first entry (OpenAI).
    ChatStyle,
    /// Role/content turns with the system prompt as a top-level field (Anthropic).
    MessagesStyle,
    /// Role-less ordered text fragments (Gemini).
    ContentsStyle,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::ChatStyle,
        ProviderKind::MessagesStyle,
        ProviderKind::ContentsStyle,
    ];

    /// Environment variables consulted for a credential, in priority order.
    pub fn credential_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::ChatStyle     => &["OPENAI_API_KEY"],
            ProviderKind::MessagesStyle => &["ANTHROPIC_API_KEY"],
            ProviderKind::ContentsStyle => &["GEMINI_API_KEY", "GOOGLE_API_KEY", "GOOGLE_GENAI_API_KEY"],
        }
    }

    /// Environment variable that overrides the backend's base URL.
    pub fn base_url_var(&self) -> &'static str {
        match self {
            ProviderKind::ChatStyle     => "OPENAI_BASE_URL",
            ProviderKind::MessagesStyle => "ANTHROPIC_BASE_URL",
            ProviderKind::ContentsStyle => "GEMINI_BASE_URL",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::ChatStyle     => "https://api.openai.com/v1",
            ProviderKind::MessagesStyle => "https://api.anthropic.com",
            ProviderKind::ContentsStyle => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::ChatStyle     => "chat-style",
            ProviderKind::MessagesStyle => "messages-style",
            ProviderKind::ContentsStyle => "contents-style",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Default generation parameters, keyed by the backend's own parameter name
/// (`temperature`, `max_tokens`, `max_output_tokens`, ...).
pub type GenerationParams = BTreeMap<String, f64>;

/// One row of the registry: shorthand → (provider kind, model, default params).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub shorthand:      String,
    pub provider_kind:  ProviderKind,
    pub model_id:       String,
    pub default_params: GenerationParams,
}

impl RegistryEntry {
    pub fn new(
        shorthand:     impl Into<String>,
        provider_kind: ProviderKind,
        model_id:      impl Into<String>,
    ) -> Self {
        Self {
            shorthand:      shorthand.into(),
            provider_kind,
            model_id:       model_id.into(),
            default_params: GenerationParams::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.default_params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<f64> {
        self.default_params.get(key).copied()
    }

    /// The model family, i.e. the model id up to its first `-`
    /// (`gpt-4.1-mini` → `gpt`, `claude-3-5-haiku` → `claude`).
    pub fn model_family(&self) -> &str {
        self.model_id.split('-').next().unwrap_or(&self.model_id)
    }
}

/// Immutable shorthand → entry lookup table.
///
/// Built once by whoever assembles the application and passed by reference
/// to `Agent` construction. There is no process-wide instance.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ModelRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The stock table: two OpenAI models, two Anthropic models and one Gemini model.
    pub fn builtin() -> Self {
        fn chat(shorthand: &str, model: &str) -> RegistryEntry {
            RegistryEntry::new(shorthand, ProviderKind::ChatStyle, model)
                .with_param("temperature", 0.7)
                .with_param("max_tokens", 1024.0)
        }
        fn messages(shorthand: &str, model: &str) -> RegistryEntry {
            RegistryEntry::new(shorthand, ProviderKind::MessagesStyle, model)
                .with_param("temperature", 0.7)
                .with_param("max_tokens", 1024.0)
        }
        fn contents(shorthand: &str, model: &str) -> RegistryEntry {
            RegistryEntry::new(shorthand, ProviderKind::ContentsStyle, model)
                .with_param("temperature", 0.7)
                .with_param("max_output_tokens", 1024.0)
        }

        let entries = [
            chat("gpt",        "gpt-4.1-mini-2025-04-14"),
            chat("4o",         "gpt-4.1-nano"),
            messages("sonnet", "claude-3-5-sonnet-20241022"),
            messages("haiku",  "claude-3-5-haiku-20241022"),
            contents("gemini", "gemini-2.0-flash-exp"),
        ];

        Self {
            entries: entries.into_iter().map(|e| (e.shorthand.clone(), e)).collect(),
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn resolve(&self, shorthand: &str) -> Result<&RegistryEntry, AgentError> {
        self.entries.get(shorthand).ok_or_else(|| {
            AgentError::Configuration(format!("Unknown model shorthand: {shorthand}"))
        })
    }

    pub fn contains(&self, shorthand: &str) -> bool {
        self.entries.contains_key(shorthand)
    }

    /// Shorthands in sorted order.
    pub fn shorthands(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self { Self::builtin() }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
    pub fn entry(mut self, entry: RegistryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Validates and freezes the table.
    ///
    /// Rejects empty shorthands or model ids, duplicate shorthands, and a
    /// model family bound to more than one provider kind.
    pub fn build(self) -> Result<ModelRegistry, AgentError> {
        let mut entries: HashMap<String, RegistryEntry> = HashMap::new();
        let mut families: HashMap<String, (ProviderKind, String)> = HashMap::new();

        for entry in self.entries {
            if entry.shorthand.is_empty() {
                return Err(AgentError::Configuration("Registry shorthand must not be empty".to_string()));
            }
            if entry.model_id.is_empty() {
                return Err(AgentError::Configuration(format!(
                    "Registry entry '{}' has an empty model id", entry.shorthand
                )));
            }
            if entries.contains_key(&entry.shorthand) {
                return Err(AgentError::Configuration(format!(
                    "Duplicate registry shorthand: {}", entry.shorthand
                )));
            }

            let family = entry.model_family().to_string();
            if let Some((kind, first)) = families.get(&family) {
                if *kind != entry.provider_kind {
                    return Err(AgentError::Configuration(format!(
                        "Model family '{}' is bound to {} by '{}' and to {} by '{}'",
                        family, kind, first, entry.provider_kind, entry.shorthand
                    )));
                }
            } else {
                families.insert(family, (entry.provider_kind, entry.shorthand.clone()));
            }

            entries.insert(entry.shorthand.clone(), entry);
        }

        Ok(ModelRegistry { entries })
    }
}
