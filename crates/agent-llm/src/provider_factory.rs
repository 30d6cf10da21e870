//! Provider Factory
//!
//! Resolves the configured model id to a provider. Backends register here;
//! the built-in `echo` model needs no credentials.

use std::sync::Arc;

use chat_core::Config;

use crate::provider::{LLMError, LLMProvider};
use crate::providers::EchoProvider;

/// Model ids served by the built-in providers
pub const AVAILABLE_MODELS: &[&str] = &["echo"];

/// Create the provider for `config.model`.
pub fn create_provider(config: &Config) -> Result<Arc<dyn LLMProvider>, LLMError> {
    match config.model.as_str() {
        "echo" => {
            log::info!("Using echo provider");
            Ok(Arc::new(EchoProvider::new()))
        }
        other => Err(LLMError::UnknownModel(format!(
            "{other} (available: {})",
            AVAILABLE_MODELS.join(", ")
        ))),
    }
}
