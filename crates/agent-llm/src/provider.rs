use crate::types::LLMChunk;
use agent_core::{tools::ToolSchema, Message};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMChunk>> + Send>>;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stream one assistant turn.
    ///
    /// # Arguments
    /// * `messages` - Conversation converted from the active tree path
    /// * `tools` - Available tools
    /// * `model` - Model id selected for the request
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        model: &str,
    ) -> Result<LLMStream>;

    /// Model ids this provider serves; reported by the health endpoint.
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }
}
