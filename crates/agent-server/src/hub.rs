//! Live sessions keyed by conversation id
//!
//! Each conversation gets one [`SessionHandle`]: the protocol session, the
//! conversation as of its last event, the cancel token of the running
//! request and a broadcast channel for live frames. All writes for a
//! conversation go through the handle's mutex, so event ids, the event log
//! and the broadcast order always agree.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use agent_core::storage::{validate_id, Storage};
use agent_core::{AgentError, Conversation};
use chat_state::{
    events_after, reduce, replay, AbortOutcome, ChatRequest, ChatSession, ChatStatus, EventId,
    ProtocolError, ServerMessage, StreamEvent,
};

pub type Result<T> = std::result::Result<T, AgentError>;

const FRAME_CHANNEL_CAPACITY: usize = 256;

pub struct SessionHandle {
    slot: Mutex<SessionSlot>,
    frames: broadcast::Sender<ServerMessage>,
}

struct SessionSlot {
    chat: ChatSession,
    conversation: Conversation,
    /// False until the first request saves the conversation.
    persisted: bool,
    cancel_token: Option<CancellationToken>,
}

impl SessionHandle {
    fn new(chat: ChatSession, conversation: Conversation, persisted: bool) -> Self {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            slot: Mutex::new(SessionSlot {
                chat,
                conversation,
                persisted,
                cancel_token: None,
            }),
            frames,
        }
    }

    pub async fn status(&self) -> ChatStatus {
        self.slot.lock().await.chat.status()
    }

    fn broadcast(&self, frame: ServerMessage) {
        // No receivers just means nobody is watching live.
        let _ = self.frames.send(frame);
    }
}

/// A request that was admitted and now needs a loop run.
pub struct StartedRequest {
    pub handle: Arc<SessionHandle>,
    pub request_id: String,
    /// The conversation with the request's snapshot, as the loop should see it.
    pub conversation: Conversation,
    pub cancel_token: CancellationToken,
    /// The conversation did not exist before this request.
    pub created: bool,
}

pub enum BeginOutcome {
    Started(StartedRequest),
    Busy(ServerMessage),
}

pub struct SessionHub {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    storage: Arc<dyn Storage>,
}

impl SessionHub {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            storage,
        }
    }

    /// Live handle for a conversation, loading it from storage on first use.
    ///
    /// Events logged after the saved snapshot's watermark are replayed so the
    /// in-memory conversation is current.
    pub async fn session(&self, conversation_id: &str) -> Result<Arc<SessionHandle>> {
        if let Some(handle) = self.sessions.read().await.get(conversation_id) {
            return Ok(handle.clone());
        }
        validate_id(conversation_id)?;

        let handle = match self.storage.get(conversation_id).await? {
            Some(mut conversation) => {
                let pending = self
                    .storage
                    .load_events_after(conversation_id, Some(conversation.last_event_id))
                    .await?;
                if let Some(last) = pending.last() {
                    log::info!(
                        "[{}] Replaying {} event(s) after saved snapshot",
                        conversation_id,
                        pending.len()
                    );
                    let (snapshot, _) = replay(std::mem::take(&mut conversation.snapshot), &pending);
                    conversation.snapshot = snapshot;
                    conversation.last_event_id = last.event_id;
                }
                let chat = ChatSession::resume(conversation_id, conversation.last_event_id);
                SessionHandle::new(chat, conversation, true)
            }
            None => SessionHandle::new(
                ChatSession::new(conversation_id),
                Conversation::new(conversation_id),
                false,
            ),
        };

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(handle));
        Ok(handle.clone())
    }

    /// `sync_response` with the persisted events after `last_event_id`.
    pub async fn sync(
        &self,
        conversation_id: &str,
        last_event_id: Option<EventId>,
    ) -> Result<ServerMessage> {
        let handle = self.session(conversation_id).await?;
        let slot = handle.slot.lock().await;
        let events = self
            .storage
            .load_events_after(conversation_id, last_event_id)
            .await?;
        Ok(slot.chat.sync_response(events_after(&events, last_event_id)))
    }

    /// Subscribes to live frames and builds the replay in one step.
    ///
    /// The subscription is taken under the session lock, so every event is
    /// either in the replay or delivered live.
    pub async fn subscribe(
        &self,
        conversation_id: &str,
        last_event_id: Option<EventId>,
    ) -> Result<(ServerMessage, broadcast::Receiver<ServerMessage>)> {
        let handle = self.session(conversation_id).await?;
        let slot = handle.slot.lock().await;
        let receiver = handle.frames.subscribe();
        let events = self
            .storage
            .load_events_after(conversation_id, last_event_id)
            .await?;
        Ok((
            slot.chat.sync_response(events_after(&events, last_event_id)),
            receiver,
        ))
    }

    /// Admits a request: claims the session, saves the request's snapshot
    /// with the current event watermark and announces `chat_started`.
    ///
    /// A snapshot that drops or changes any message the conversation already
    /// has is refused with [`ProtocolError::StaleSnapshot`]; the client has
    /// to sync and rebuild its request.
    pub async fn begin(&self, request: ChatRequest, model: &str) -> Result<BeginOutcome> {
        let ChatRequest {
            request_id,
            conversation_id,
            snapshot,
        } = request;
        let handle = self.session(&conversation_id).await?;
        let mut slot = handle.slot.lock().await;

        if let Some(current) = slot.chat.active_request() {
            log::info!(
                "[{}] Rejecting request {}: {} is running",
                conversation_id,
                request_id,
                current
            );
            return Ok(BeginOutcome::Busy(ServerMessage::Busy {
                current_request_id: current.to_string(),
            }));
        }
        if !snapshot.extends(&slot.conversation.snapshot) {
            let last_event_id = slot.chat.last_event_id();
            log::warn!(
                "[{}] Rejecting request {}: snapshot is behind event {}",
                conversation_id,
                request_id,
                last_event_id
            );
            return Err(ProtocolError::StaleSnapshot { last_event_id }.into());
        }
        slot.chat.start(&request_id)?;

        let watermark = slot.chat.last_event_id();
        slot.conversation.update_snapshot(snapshot, watermark);
        slot.conversation.model = Some(model.to_string());
        if let Err(error) = self.storage.save(&slot.conversation).await {
            log::error!("[{}] Failed to save conversation: {}", conversation_id, error);
            slot.chat.finish(&request_id, ChatStatus::Error);
            return Err(error.into());
        }

        let created = !slot.persisted;
        slot.persisted = true;
        let cancel_token = CancellationToken::new();
        slot.cancel_token = Some(cancel_token.clone());
        handle.broadcast(ServerMessage::ChatStarted {
            request_id: request_id.clone(),
        });

        let conversation = slot.conversation.clone();
        drop(slot);
        Ok(BeginOutcome::Started(StartedRequest {
            handle,
            request_id,
            conversation,
            cancel_token,
            created,
        }))
    }

    /// Persists and broadcasts one event of a running request.
    ///
    /// Returns false once the request takes no more events: it was aborted
    /// or finished, or its event could not be logged. A failed append ends
    /// the request as `error` without folding or broadcasting the event.
    pub async fn publish(&self, handle: &SessionHandle, request_id: &str, event: StreamEvent) -> bool {
        let mut slot = handle.slot.lock().await;
        let Some(envelope) = slot.chat.record(request_id, event, Utc::now()) else {
            return false;
        };
        let conversation_id = slot.conversation.id.clone();

        if let Err(error) = self.storage.append_event(&conversation_id, &envelope).await {
            log::error!(
                "[{}] Failed to persist event {}: {}",
                conversation_id,
                envelope.event_id,
                error
            );
            slot.chat.unrecord(envelope.event_id);
            if let Some(token) = slot.cancel_token.take() {
                token.cancel();
            }
            if let Some(frame) = slot.chat.finish(request_id, ChatStatus::Error) {
                slot.conversation.updated_at = Utc::now();
                self.persist(&slot.conversation).await;
                handle.broadcast(frame);
            }
            return false;
        }

        let state = std::mem::take(&mut slot.conversation.snapshot);
        slot.conversation.snapshot = reduce(state, &envelope.event, envelope.created_at).snapshot;
        slot.conversation.last_event_id = envelope.event_id;
        if matches!(envelope.event, StreamEvent::ConversationUpdated { .. }) {
            slot.conversation.updated_at = envelope.created_at;
            self.persist(&slot.conversation).await;
        }

        handle.broadcast(ServerMessage::ChatEvent(envelope));
        true
    }

    /// Settles a request the loop finished. No-op if it was aborted first.
    pub async fn finish(&self, handle: &SessionHandle, request_id: &str, status: ChatStatus) {
        let mut slot = handle.slot.lock().await;
        let Some(frame) = slot.chat.finish(request_id, status) else {
            return;
        };
        slot.cancel_token = None;
        slot.conversation.updated_at = Utc::now();
        self.persist(&slot.conversation).await;
        handle.broadcast(frame);
    }

    /// Aborts the running request, if any (and if it matches `request_id`).
    ///
    /// Returns `chat_finished` for an abort that took effect, otherwise a
    /// `sync_response` describing the session.
    pub async fn abort(
        &self,
        conversation_id: &str,
        request_id: Option<&str>,
    ) -> Result<ServerMessage> {
        let handle = self.session(conversation_id).await?;
        let mut slot = handle.slot.lock().await;

        match slot.chat.abort(request_id) {
            AbortOutcome::Aborted { request_id } => {
                if let Some(token) = slot.cancel_token.take() {
                    token.cancel();
                }
                slot.conversation.updated_at = Utc::now();
                self.persist(&slot.conversation).await;
                let frame = ServerMessage::ChatFinished {
                    request_id,
                    status: ChatStatus::Aborted,
                };
                handle.broadcast(frame.clone());
                Ok(frame)
            }
            AbortOutcome::NotRunning => {
                log::debug!("[{}] Abort with nothing running", conversation_id);
                Ok(slot.chat.sync_response(Vec::new()))
            }
        }
    }

    /// Aborts any running request, then removes the conversation.
    pub async fn delete(&self, conversation_id: &str) -> Result<bool> {
        self.abort(conversation_id, None).await?;
        self.sessions.write().await.remove(conversation_id);
        Ok(self.storage.delete(conversation_id).await?)
    }

    async fn persist(&self, conversation: &Conversation) {
        if let Err(error) = self.storage.save(conversation).await {
            log::error!("[{}] Failed to save conversation: {}", conversation.id, error);
        }
    }
}
