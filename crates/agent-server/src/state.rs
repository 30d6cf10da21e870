use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;

use agent_core::storage::{JsonlStorage, Storage};
use agent_core::tools::{NoopToolExecutor, ToolExecutor};
use agent_core::AgentError;
use agent_llm::{create_provider, LLMProvider};
use agent_loop::{run_agent_loop_with_config, AgentLoopConfig};
use chat_core::Config;
use chat_state::{ChatRequest, ChatStatus, ServerMessage, StreamEvent};

use crate::hub::{BeginOutcome, SessionHub, StartedRequest};

const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SessionHub>,
    pub storage: Arc<dyn Storage>,
    pub llm: Arc<dyn LLMProvider>,
    pub tools: Arc<dyn ToolExecutor>,
    pub loop_config: AgentLoopConfig,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LLMProvider>,
        tools: Arc<dyn ToolExecutor>,
        loop_config: AgentLoopConfig,
    ) -> Self {
        Self {
            hub: Arc::new(SessionHub::new(storage.clone())),
            storage,
            llm,
            tools,
            loop_config,
        }
    }

    /// State backed by the on-disk store under the configured data dir.
    pub async fn from_config(config: &Config) -> io::Result<Self> {
        let data_dir = config.data_dir();
        log::info!("Initializing storage at: {:?}", data_dir);
        let storage = JsonlStorage::new(&data_dir);
        storage.init().await?;

        log::info!("Creating LLM provider for model: {}", config.model);
        let llm = create_provider(config).map_err(io::Error::other)?;

        Ok(Self::new(
            Arc::new(storage),
            llm,
            Arc::new(NoopToolExecutor),
            AgentLoopConfig::from_config(config),
        ))
    }

    /// Admits a validated `chat_request` and runs it in the background.
    ///
    /// Returns `chat_started`, or `busy` when another request is running.
    pub async fn start_chat(&self, request: ChatRequest) -> Result<ServerMessage, AgentError> {
        match self.hub.begin(request, &self.loop_config.model).await? {
            BeginOutcome::Busy(frame) => Ok(frame),
            BeginOutcome::Started(started) => {
                let request_id = started.request_id.clone();
                tokio::spawn(run_request(self.clone(), started));
                Ok(ServerMessage::ChatStarted { request_id })
            }
        }
    }
}

/// Pumps loop events through the hub, then settles the request.
async fn run_request(state: AppState, started: StartedRequest) {
    let StartedRequest {
        handle,
        request_id,
        conversation,
        cancel_token,
        created,
    } = started;
    let conversation_id = conversation.id.clone();
    log::info!("[{}] Running request {}", conversation_id, request_id);

    if created {
        let announced = state
            .hub
            .publish(
                &handle,
                &request_id,
                StreamEvent::ConversationCreated {
                    conversation: conversation.summary(),
                },
            )
            .await;
        if !announced {
            log::warn!("[{}] Request {} ended before it ran", conversation_id, request_id);
            return;
        }
    }

    let (event_tx, mut event_rx) = mpsc::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);
    let run = tokio::spawn(run_agent_loop_with_config(
        conversation,
        event_tx,
        state.llm.clone(),
        state.tools.clone(),
        cancel_token,
        state.loop_config.clone(),
    ));

    while let Some(event) = event_rx.recv().await {
        if !state.hub.publish(&handle, &request_id, event).await {
            break;
        }
    }
    // The loop sees a closed channel and its token is already cancelled.
    drop(event_rx);

    let status = match run.await {
        Ok(outcome) => outcome.status,
        Err(error) => {
            log::error!("[{}] Agent loop task failed: {}", conversation_id, error);
            ChatStatus::Error
        }
    };
    state.hub.finish(&handle, &request_id, status).await;
}
