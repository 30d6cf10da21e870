use async_trait::async_trait;
use agent_core::{tools::ToolSchema, Message, Role};
use futures::stream;

use crate::provider::{LLMProvider, LLMStream, Result};
use crate::types::LLMChunk;

/// Replies with the last user message, word by word.
///
/// Lets the server and CLI run end to end without a model backend.
#[derive(Debug, Default, Clone)]
pub struct EchoProvider;

impl EchoProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LLMProvider for EchoProvider {
    async fn chat_stream(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _model: &str,
    ) -> Result<LLMStream> {
        let text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let mut chunks: Vec<Result<LLMChunk>> = text
            .split_inclusive(' ')
            .map(|word| Ok(LLMChunk::Token(word.to_string())))
            .collect();
        chunks.push(Ok(LLMChunk::Done));

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["echo".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn echoes_last_user_message() {
        let messages = vec![Message::user("first"), Message::user("hello there")];
        let chunks: Vec<_> = EchoProvider::new()
            .chat_stream(&messages, &[], "echo")
            .await
            .unwrap()
            .collect()
            .await;

        let text: String = chunks
            .into_iter()
            .filter_map(|chunk| match chunk {
                Ok(LLMChunk::Token(t)) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(text, "hello there");
    }
}
