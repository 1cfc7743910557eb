pub mod agent;
pub mod builder;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod normalize;
pub mod registry;
pub mod trace;
pub mod usage;

// Convenience re-exports at crate root
pub use agent::{Agent, ConcurrencyPolicy, Reply};
pub use builder::AgentBuilder;
pub use config::Settings;
pub use error::AgentError;
pub use history::{History, Role, Turn};
pub use llm::{Completion, MockBackend, MockReply, NativeBackend, ProviderBackend, UnifiedRequest};
pub use normalize::{normalize, require_keys};
pub use registry::{ModelRegistry, ProviderKind, RegistryEntry};
pub use trace::{CallOutcome, CallRecord, Trace};
pub use usage::TokenUsage;
pub use tokio_util::sync::CancellationToken;
