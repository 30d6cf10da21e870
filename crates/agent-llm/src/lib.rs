pub mod provider;
pub mod provider_factory;
pub mod providers;
pub mod types;

pub use provider::{LLMError, LLMProvider, LLMStream};
pub use provider_factory::{create_provider, AVAILABLE_MODELS};
pub use providers::{EchoProvider, ScriptedProvider, ScriptedTurn};
pub use types::LLMChunk;
