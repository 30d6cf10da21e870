pub mod config;
pub mod runner;
pub mod sink;
pub mod stream;

pub use config::AgentLoopConfig;
pub use runner::{run_agent_loop, run_agent_loop_with_config, LoopOutcome};
pub use sink::EventSink;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use agent_core::tools::{
        NoopToolExecutor, ToolCall, ToolExecutor, ToolProgressSender, ToolResult, ToolSchema,
    };
    use agent_core::{Conversation, Role as ProviderRole};
    use agent_llm::{LLMChunk, ScriptedProvider, ScriptedTurn};
    use async_trait::async_trait;
    use chat_core::{Block, ResearchItem, Role, ToolProgress, TreeSnapshot};
    use chat_state::{ChatStatus, StreamEvent};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    use crate::config::AgentLoopConfig;
    use crate::runner::{run_agent_loop, run_agent_loop_with_config};

    struct DownloadTool;

    #[async_trait]
    impl ToolExecutor for DownloadTool {
        async fn execute(
            &self,
            call: &ToolCall,
            progress: ToolProgressSender,
        ) -> agent_core::tools::executor::Result<ToolResult> {
            let _ = progress
                .send(ToolProgress {
                    stage: "downloading".to_string(),
                    message: format!("fetching for {}", call.id),
                    received_bytes: Some(512),
                    total_bytes: Some(1024),
                })
                .await;
            Ok(ToolResult::ok("saved"))
        }

        fn list_tools(&self) -> Vec<ToolSchema> {
            vec![ToolSchema::function(
                "download",
                "Download a file",
                serde_json::json!({"type": "object"}),
            )]
        }
    }

    struct StuckTool;

    #[async_trait]
    impl ToolExecutor for StuckTool {
        async fn execute(
            &self,
            _call: &ToolCall,
            _progress: ToolProgressSender,
        ) -> agent_core::tools::executor::Result<ToolResult> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ToolResult::ok("too late"))
        }

        fn list_tools(&self) -> Vec<ToolSchema> {
            Vec::new()
        }
    }

    fn conversation(prompt: &str) -> Conversation {
        let mut conversation = Conversation::new("c1");
        conversation.snapshot = TreeSnapshot::new()
            .add_message(Role::User, vec![Block::content(prompt)], None)
            .0;
        conversation
    }

    fn tokens(parts: &[&str]) -> ScriptedTurn {
        let mut chunks: Vec<LLMChunk> = parts
            .iter()
            .map(|part| LLMChunk::Token(part.to_string()))
            .collect();
        chunks.push(LLMChunk::Done);
        ScriptedTurn::Chunks(chunks)
    }

    fn tool_turn(id: &str, name: &str) -> ScriptedTurn {
        ScriptedTurn::Chunks(vec![
            LLMChunk::ToolCalls(vec![ToolCall::new(id, name, r#"{"url":"https://example.com"}"#)]),
            LLMChunk::Done,
        ])
    }

    fn collect_events(mut rx: mpsc::Receiver<StreamEvent>) -> JoinHandle<Vec<StreamEvent>> {
        tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        })
    }

    #[test]
    fn agent_loop_config_default() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.max_iterations, 200);
        assert_eq!(config.model, "echo");
        assert!(config.system_prompt.is_none());
        assert!(config.additional_tool_schemas.is_empty());
    }

    #[tokio::test]
    async fn plain_reply_completes() {
        let llm = Arc::new(ScriptedProvider::new([tokens(&["Hello", " world"])]));
        let (event_tx, event_rx) = mpsc::channel(16);
        let collector = collect_events(event_rx);

        let outcome = run_agent_loop_with_config(
            conversation("hi"),
            event_tx,
            llm.clone(),
            Arc::new(NoopToolExecutor),
            CancellationToken::new(),
            AgentLoopConfig {
                system_prompt: Some("be brief".to_string()),
                ..Default::default()
            },
        )
        .await;

        assert_eq!(outcome.status, ChatStatus::Completed);
        assert_eq!(outcome.iterations, 1);
        let reply = outcome.snapshot.last_message().unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.blocks, vec![Block::content("Hello world")]);

        let events = collector.await.unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::content("Hello"), StreamEvent::content(" world")]
        );

        let request = &llm.requests()[0];
        assert_eq!(request[0].role, ProviderRole::System);
        assert_eq!(request[1].content, "hi");
    }

    #[tokio::test]
    async fn tool_round_forwards_progress_and_result() {
        let llm = Arc::new(ScriptedProvider::new([
            tool_turn("call_1", "download"),
            tokens(&["done"]),
        ]));
        let (event_tx, event_rx) = mpsc::channel(16);
        let collector = collect_events(event_rx);

        let outcome = run_agent_loop(
            conversation("fetch it"),
            event_tx,
            llm.clone(),
            Arc::new(DownloadTool),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, ChatStatus::Completed);
        assert_eq!(outcome.iterations, 2);

        let events = collector.await.unwrap();
        let kinds: Vec<&str> = events.iter().map(StreamEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "tool_call",
                "tool_progress",
                "tool_result",
                "conversation_updated",
                "content"
            ]
        );
        match &events[3] {
            StreamEvent::ConversationUpdated { conversation } => {
                assert_eq!(conversation.id, "c1");
                assert_eq!(conversation.message_count, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let reply = outcome.snapshot.last_message().unwrap();
        match &reply.blocks[0] {
            Block::Research { items } => match &items[0] {
                ResearchItem::Tool {
                    call,
                    progress,
                    result,
                    call_id,
                } => {
                    assert_eq!(call.name, "download");
                    assert_eq!(progress.len(), 1);
                    assert_eq!(result.as_deref(), Some("saved"));
                    assert_eq!(call_id.as_deref(), Some("call_1"));
                }
                other => panic!("unexpected item {other:?}"),
            },
            other => panic!("unexpected block {other:?}"),
        }
        assert_eq!(reply.blocks[1], Block::content("done"));

        let second_request = &llm.requests()[1];
        let tool_message = second_request.last().unwrap();
        assert_eq!(tool_message.role, ProviderRole::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_message.content, "saved");
    }

    #[tokio::test]
    async fn tool_errors_become_result_text() {
        let llm = Arc::new(ScriptedProvider::new([
            tool_turn("call_1", "missing"),
            tokens(&["ok"]),
        ]));
        let (event_tx, event_rx) = mpsc::channel(16);
        let collector = collect_events(event_rx);

        let outcome = run_agent_loop(
            conversation("go"),
            event_tx,
            llm,
            Arc::new(NoopToolExecutor),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, ChatStatus::Completed);
        let events = collector.await.unwrap();
        let result = events
            .iter()
            .find_map(|event| match event {
                StreamEvent::ToolResult { result, .. } => result.as_str().map(str::to_string),
                _ => None,
            })
            .unwrap();
        assert!(result.starts_with("Error: "));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
    }

    #[tokio::test]
    async fn iteration_cap_emits_exactly_one_error() {
        let llm = Arc::new(ScriptedProvider::new([tool_turn("call_1", "download")]));
        let (event_tx, event_rx) = mpsc::channel(64);
        let collector = collect_events(event_rx);

        let outcome = run_agent_loop(
            conversation("loop forever"),
            event_tx,
            llm.clone(),
            Arc::new(DownloadTool),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, ChatStatus::Completed);
        assert_eq!(outcome.iterations, 200);
        assert_eq!(llm.call_count(), 200);

        let events = collector.await.unwrap();
        let errors: Vec<&String> = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Error { message } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("iteration=200 maxIterations=200 model=echo"));
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
    }

    #[tokio::test]
    async fn provider_rejection_ends_with_error_status() {
        let llm = Arc::new(ScriptedProvider::new([ScriptedTurn::Reject(
            "quota exceeded".to_string(),
        )]));
        let (event_tx, event_rx) = mpsc::channel(16);
        let collector = collect_events(event_rx);

        let outcome = run_agent_loop(
            conversation("hi"),
            event_tx,
            llm,
            Arc::new(NoopToolExecutor),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, ChatStatus::Error);
        let reply = outcome.snapshot.last_message().unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert!(matches!(&reply.blocks[0], Block::Error { message } if message.contains("quota exceeded")));

        let events = collector.await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_text() {
        let llm = Arc::new(ScriptedProvider::new([ScriptedTurn::FailAfter(
            vec![LLMChunk::Token("partial".to_string())],
            "reset".to_string(),
        )]));
        let (event_tx, _event_rx) = mpsc::channel(16);

        let outcome = run_agent_loop(
            conversation("hi"),
            event_tx,
            llm,
            Arc::new(NoopToolExecutor),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, ChatStatus::Error);
        let reply = outcome.snapshot.last_message().unwrap();
        assert_eq!(reply.blocks[0], Block::content("partial"));
        assert!(matches!(reply.blocks[1], Block::Error { .. }));
    }

    #[tokio::test]
    async fn cancellation_mid_stream_aborts_and_keeps_content() {
        let llm = Arc::new(
            ScriptedProvider::new([tokens(&["one ", "two ", "three ", "four"])])
                .with_chunk_delay(Duration::from_millis(100)),
        );
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let cancel_token = CancellationToken::new();

        let run = tokio::spawn(run_agent_loop(
            conversation("count"),
            event_tx,
            llm,
            Arc::new(NoopToolExecutor),
            cancel_token.clone(),
        ));

        assert_eq!(event_rx.recv().await, Some(StreamEvent::content("one ")));
        cancel_token.cancel();

        let outcome = run.await.unwrap();
        assert_eq!(outcome.status, ChatStatus::Aborted);
        let text = outcome.snapshot.last_message().unwrap().text();
        assert!(text.starts_with("one "));
        assert_ne!(text, "one two three four");
    }

    #[tokio::test]
    async fn cancellation_interrupts_running_tool() {
        let llm = Arc::new(ScriptedProvider::new([tool_turn("call_1", "slow")]));
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let cancel_token = CancellationToken::new();

        let run = tokio::spawn(run_agent_loop(
            conversation("wait"),
            event_tx,
            llm,
            Arc::new(StuckTool),
            cancel_token.clone(),
        ));

        assert!(matches!(
            event_rx.recv().await,
            Some(StreamEvent::ToolCall { .. })
        ));
        cancel_token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("loop should stop promptly")
            .unwrap();
        assert_eq!(outcome.status, ChatStatus::Aborted);
    }
}
