use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_core::tools::{execute_tool_call, parse_tool_args, ToolCall, ToolExecutor, ToolResult, ToolSchema};
use agent_core::{convert_path_to_messages, AgentError, Conversation, Message};
use agent_llm::LLMProvider;
use chat_core::{ToolProgress, TreeSnapshot};
use chat_state::{ChatStatus, StreamEvent};

use crate::config::AgentLoopConfig;
use crate::sink::EventSink;
use crate::stream::consume_llm_stream;

pub type Result<T> = std::result::Result<T, AgentError>;

const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// How a run ended.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// `Completed`, `Aborted` or `Error`.
    pub status: ChatStatus,
    /// Provider turns started.
    pub iterations: u32,
    /// The conversation with every emitted event applied.
    pub snapshot: TreeSnapshot,
}

/// Generates the assistant reply for the conversation's current path.
///
/// Events go out on `event_tx` in the order they are applied. Provider
/// failures end the run with an `error` event and `ChatStatus::Error`; tool
/// failures are reported to the model as result text; cancellation ends the
/// run with `ChatStatus::Aborted` and keeps whatever was produced.
pub async fn run_agent_loop_with_config(
    conversation: Conversation,
    event_tx: mpsc::Sender<StreamEvent>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<dyn ToolExecutor>,
    cancel_token: CancellationToken,
    config: AgentLoopConfig,
) -> LoopOutcome {
    let debug_logger = DebugLogger::new(log::log_enabled!(log::Level::Debug));
    let conversation_id = conversation.id.clone();
    let mut sink = EventSink::new(conversation, event_tx);
    let mut iterations = 0u32;

    debug_logger.log_event(
        &conversation_id,
        "agent_loop_start",
        serde_json::json!({
            "model": config.model,
            "max_iterations": config.max_iterations,
            "message_count": sink.snapshot().messages.len(),
        }),
    );

    let result = run_iterations(
        &mut sink,
        &mut iterations,
        llm.as_ref(),
        tools.as_ref(),
        &cancel_token,
        &config,
        &debug_logger,
    )
    .await;

    let status = match result {
        Ok(()) => ChatStatus::Completed,
        Err(AgentError::Cancelled) => {
            log::info!("[{}] Agent loop cancelled", conversation_id);
            ChatStatus::Aborted
        }
        Err(error) => {
            log::error!("[{}] Agent loop failed: {}", conversation_id, error);
            sink.emit(StreamEvent::error(error.to_string())).await;
            ChatStatus::Error
        }
    };

    log::info!(
        "[{}] Agent loop finished after {} iteration(s): {}",
        conversation_id,
        iterations,
        status
    );

    LoopOutcome {
        status,
        iterations,
        snapshot: sink.into_snapshot(),
    }
}

/// [`run_agent_loop_with_config`] with default settings.
pub async fn run_agent_loop(
    conversation: Conversation,
    event_tx: mpsc::Sender<StreamEvent>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<dyn ToolExecutor>,
    cancel_token: CancellationToken,
) -> LoopOutcome {
    run_agent_loop_with_config(
        conversation,
        event_tx,
        llm,
        tools,
        cancel_token,
        AgentLoopConfig::default(),
    )
    .await
}

async fn run_iterations(
    sink: &mut EventSink,
    iterations: &mut u32,
    llm: &dyn LLMProvider,
    tools: &dyn ToolExecutor,
    cancel_token: &CancellationToken,
    config: &AgentLoopConfig,
    debug_logger: &DebugLogger,
) -> Result<()> {
    let conversation_id = sink.conversation_id().to_string();
    let mut messages = convert_path_to_messages(sink.snapshot(), config.system_prompt.as_deref())?;
    let tool_schemas = resolve_available_tool_schemas(config, tools);

    while *iterations < config.max_iterations {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        *iterations += 1;

        debug_logger.log_event(
            &conversation_id,
            "iteration_start",
            serde_json::json!({
                "iteration": *iterations,
                "message_count": messages.len(),
            }),
        );

        let timer = Timer::new("llm_request");
        let stream = llm
            .chat_stream(&messages, &tool_schemas, &config.model)
            .await
            .map_err(|error| AgentError::LLM(error.to_string()))?;
        let turn = consume_llm_stream(stream, sink, cancel_token).await?;
        timer.debug(&conversation_id);
        log::debug!(
            "[{}] Turn {} produced {} bytes and {} tool call(s)",
            conversation_id,
            iterations,
            turn.token_count,
            turn.pending_tool_calls.len()
        );

        if turn.pending_tool_calls.is_empty() {
            return Ok(());
        }

        messages.push(Message::assistant(
            turn.content,
            Some(turn.pending_tool_calls.clone()),
        ));

        for tool_call in &turn.pending_tool_calls {
            let args = parse_tool_args(&tool_call.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            sink.emit(StreamEvent::ToolCall {
                tool: tool_call.function.name.clone(),
                args,
                call_id: Some(tool_call.id.clone()),
            })
            .await;

            let tool_timer = Timer::new(format!("tool_{}", tool_call.function.name));
            let result = execute_with_progress(tool_call, tools, sink, cancel_token).await?;
            tool_timer.debug(&conversation_id);

            sink.emit(StreamEvent::ToolResult {
                tool: tool_call.function.name.clone(),
                result: serde_json::Value::String(result.result.clone()),
                call_id: Some(tool_call.id.clone()),
            })
            .await;
            messages.push(Message::tool_result(tool_call.id.clone(), result.result));

            if cancel_token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
        }

        sink.emit_updated().await;
    }

    log::warn!(
        "[{}] Tool iteration limit reached ({})",
        conversation_id,
        config.max_iterations
    );
    sink.emit(StreamEvent::error(format!(
        "Stopped after too many tool rounds: iteration={} maxIterations={} model={}",
        iterations, config.max_iterations, config.model
    )))
    .await;
    Ok(())
}

/// Runs one call, forwarding its progress reports while it is in flight.
async fn execute_with_progress(
    tool_call: &ToolCall,
    tools: &dyn ToolExecutor,
    sink: &mut EventSink,
    cancel_token: &CancellationToken,
) -> Result<ToolResult> {
    let (progress_tx, mut progress_rx) = mpsc::channel::<ToolProgress>(PROGRESS_CHANNEL_CAPACITY);
    let execution = execute_tool_call(tool_call, tools, progress_tx);
    tokio::pin!(execution);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(AgentError::Cancelled),
            Some(progress) = progress_rx.recv() => {
                sink.emit(progress_event(tool_call, progress)).await;
            }
            result = &mut execution => {
                while let Ok(progress) = progress_rx.try_recv() {
                    sink.emit(progress_event(tool_call, progress)).await;
                }
                return Ok(result);
            }
        }
    }
}

fn progress_event(tool_call: &ToolCall, progress: ToolProgress) -> StreamEvent {
    StreamEvent::ToolProgress {
        tool: tool_call.function.name.clone(),
        stage: progress.stage,
        message: progress.message,
        received_bytes: progress.received_bytes,
        total_bytes: progress.total_bytes,
        call_id: Some(tool_call.id.clone()),
    }
}

fn resolve_available_tool_schemas(
    config: &AgentLoopConfig,
    tools: &dyn ToolExecutor,
) -> Vec<ToolSchema> {
    let mut schemas = tools.list_tools();
    for schema in &config.additional_tool_schemas {
        if !schemas
            .iter()
            .any(|existing| existing.function.name == schema.function.name)
        {
            schemas.push(schema.clone());
        }
    }
    schemas
}

struct DebugLogger {
    enabled: bool,
}

impl DebugLogger {
    fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn log_event(&self, conversation_id: &str, event_type: &str, details: serde_json::Value) {
        if !self.enabled {
            return;
        }

        log::debug!("[{}] {}: {}", conversation_id, event_type, details);
    }
}

struct Timer {
    name: String,
    start: std::time::Instant,
}

impl Timer {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: std::time::Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    fn debug(&self, conversation_id: &str) {
        log::debug!(
            "[{}] {} completed in {}ms",
            conversation_id,
            self.name,
            self.elapsed_ms()
        );
    }
}
