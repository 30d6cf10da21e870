use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use agent_core::tools::{ToolCall, ToolCallAccumulator};
use agent_core::AgentError;
use agent_llm::{LLMChunk, LLMStream};
use chat_state::StreamEvent;

use crate::sink::EventSink;

/// What one provider turn produced.
#[derive(Debug, Default)]
pub struct TurnOutput {
    pub content: String,
    pub token_count: usize,
    pub pending_tool_calls: Vec<ToolCall>,
}

/// Drains a provider stream, forwarding text and thinking deltas as they
/// arrive and assembling tool call fragments.
///
/// Cancellation is observed while waiting for every chunk; a stream error
/// ends the turn with `AgentError::LLM` and the text emitted so far stays in
/// the snapshot.
pub async fn consume_llm_stream(
    mut stream: LLMStream,
    sink: &mut EventSink,
    cancel_token: &CancellationToken,
) -> Result<TurnOutput, AgentError> {
    let conversation_id = sink.conversation_id().to_string();
    let mut content = String::new();
    let mut token_count = 0usize;
    let mut tool_calls = ToolCallAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(AgentError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else {
            break;
        };

        match chunk_result {
            Ok(LLMChunk::Token(token)) => {
                if token.is_empty() {
                    continue;
                }
                token_count += token.len();
                content.push_str(&token);
                sink.emit(StreamEvent::content(token)).await;
            }
            Ok(LLMChunk::Thinking(text)) => {
                if !text.is_empty() {
                    sink.emit(StreamEvent::thinking(text)).await;
                }
            }
            Ok(LLMChunk::ToolCalls(partial_calls)) => {
                log::debug!(
                    "[{}] Received {} tool call parts",
                    conversation_id,
                    partial_calls.len()
                );
                tool_calls.extend(partial_calls);
            }
            Ok(LLMChunk::Done) => {
                log::debug!("[{}] LLM stream completed", conversation_id);
                break;
            }
            Err(error) => return Err(AgentError::LLM(error.to_string())),
        }
    }

    Ok(TurnOutput {
        content,
        token_count,
        pending_tool_calls: tool_calls.finish(),
    })
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use agent_core::tools::ToolCall;
    use agent_core::Conversation;
    use agent_llm::{LLMError, LLMStream};
    use chat_core::{Block, Role, TreeSnapshot};

    use super::*;

    fn build_stream(items: Vec<agent_llm::provider::Result<LLMChunk>>) -> LLMStream {
        Box::pin(stream::iter(items))
    }

    fn sink() -> (EventSink, mpsc::Receiver<StreamEvent>) {
        let mut conversation = Conversation::new("c1");
        conversation.snapshot = TreeSnapshot::new()
            .add_message(Role::User, vec![Block::content("hi")], None)
            .0;
        let (tx, rx) = mpsc::channel(16);
        (EventSink::new(conversation, tx), rx)
    }

    #[tokio::test]
    async fn consume_llm_stream_accumulates_tokens_and_tool_calls() {
        let stream = build_stream(vec![
            Ok(LLMChunk::Thinking("plan".to_string())),
            Ok(LLMChunk::Token("hi".to_string())),
            Ok(LLMChunk::ToolCalls(vec![ToolCall::new("call_1", "test_tool", "{")])),
            Ok(LLMChunk::ToolCalls(vec![ToolCall::new("call_1", "", "}")])),
            Ok(LLMChunk::Done),
        ]);

        let (mut sink, mut event_rx) = sink();
        let output = consume_llm_stream(stream, &mut sink, &CancellationToken::new())
            .await
            .expect("stream should succeed");

        assert_eq!(output.content, "hi");
        assert_eq!(output.token_count, 2);
        assert_eq!(output.pending_tool_calls.len(), 1);
        assert_eq!(output.pending_tool_calls[0].function.name, "test_tool");
        assert_eq!(output.pending_tool_calls[0].function.arguments, "{}");

        assert_eq!(event_rx.recv().await, Some(StreamEvent::thinking("plan")));
        assert_eq!(event_rx.recv().await, Some(StreamEvent::content("hi")));

        let reply = sink.snapshot().last_message().unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text(), "hi");
    }

    #[tokio::test]
    async fn stream_error_keeps_partial_content() {
        let stream = build_stream(vec![
            Ok(LLMChunk::Token("part".to_string())),
            Err(LLMError::Stream("connection reset".to_string())),
        ]);

        let (mut sink, _rx) = sink();
        let result = consume_llm_stream(stream, &mut sink, &CancellationToken::new()).await;

        assert!(matches!(result, Err(AgentError::LLM(message)) if message.contains("connection reset")));
        assert_eq!(sink.snapshot().last_message().unwrap().text(), "part");
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_next_chunk() {
        let stream = build_stream(vec![Ok(LLMChunk::Token("never".to_string()))]);
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        let (mut sink, _rx) = sink();
        let result = consume_llm_stream(stream, &mut sink, &cancel_token).await;

        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(sink.snapshot().messages.len(), 1);
    }
}
