//! Client-side session state
//!
//! Tracks the local snapshot, the last applied event id and the request
//! status. Server frames are applied through the reducer; events already
//! seen are skipped and a hole in the id sequence is reported so the caller
//! can resync from the cursor.

use chat_core::{Block, Role, TreeSnapshot};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::machine::{ChatStatus, StatusMachine};
use crate::protocol::{ChatEventEnvelope, ClientMessage, EventId, ServerMessage};
use crate::reducer::{reduce, ConversationChange};

#[derive(Debug, Clone)]
pub struct ClientSession {
    conversation_id: String,
    snapshot: TreeSnapshot,
    last_event_id: EventId,
    machine: StatusMachine,
    active_request: Option<String>,
}

impl ClientSession {
    /// Starts from a snapshot that already reflects every event up to
    /// `last_event_id`.
    pub fn new(conversation_id: impl Into<String>, snapshot: TreeSnapshot, last_event_id: EventId) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            snapshot,
            last_event_id,
            machine: StatusMachine::new(),
            active_request: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn snapshot(&self) -> &TreeSnapshot {
        &self.snapshot
    }

    pub fn last_event_id(&self) -> EventId {
        self.last_event_id
    }

    pub fn status(&self) -> ChatStatus {
        self.machine.status()
    }

    pub fn active_request(&self) -> Option<&str> {
        self.active_request.as_deref()
    }

    /// `sync` frame resuming from the cursor.
    pub fn sync(&self) -> ClientMessage {
        ClientMessage::Sync {
            conversation_id: self.conversation_id.clone(),
            last_event_id: Some(self.last_event_id),
        }
    }

    /// Replaces the local snapshot (after an edit, branch switch or
    /// regenerate) and builds the `chat_request` for it.
    pub fn begin_request(&mut self, snapshot: TreeSnapshot) -> Result<ClientMessage, ProtocolError> {
        if let Some(current) = &self.active_request {
            return Err(ProtocolError::Busy {
                current_request_id: current.clone(),
            });
        }

        let request_id = Uuid::new_v4().to_string();
        self.snapshot = snapshot;
        self.adopt_status(ChatStatus::Running, Some(request_id.clone()));

        Ok(ClientMessage::ChatRequest {
            request_id,
            conversation_id: self.conversation_id.clone(),
            role: Role::Assistant,
            conversation_history: Vec::new(),
            tree_snapshot: self.snapshot.clone(),
        })
    }

    /// Appends a user turn to the active path and requests a reply.
    pub fn send_text(&mut self, text: &str) -> Result<ClientMessage, ProtocolError> {
        let (snapshot, _) = self
            .snapshot
            .clone()
            .add_message(Role::User, vec![Block::content(text)], None);
        self.begin_request(snapshot)
    }

    /// `abort` frame for the in-flight request, if there is one.
    pub fn abort(&mut self) -> Option<ClientMessage> {
        let request_id = self.active_request.take()?;
        self.adopt_status(ChatStatus::Aborted, None);
        Some(ClientMessage::Abort {
            conversation_id: self.conversation_id.clone(),
            request_id: Some(request_id),
        })
    }

    /// Moves to another conversation. The returned `abort` (if any) must be
    /// sent before anything for the new conversation.
    pub fn switch_conversation(
        &mut self,
        conversation_id: impl Into<String>,
        snapshot: TreeSnapshot,
        last_event_id: EventId,
    ) -> Option<ClientMessage> {
        let abort = self.abort();
        *self = Self::new(conversation_id, snapshot, last_event_id);
        abort
    }

    /// Applies one server frame.
    ///
    /// Events before a gap stay applied when the gap is reported.
    pub fn handle(&mut self, message: ServerMessage) -> Result<Vec<ConversationChange>, ProtocolError> {
        match message {
            ServerMessage::SyncResponse {
                status,
                request_id,
                events,
            } => {
                let mut changes = Vec::new();
                for envelope in &events {
                    changes.extend(self.apply(envelope)?);
                }
                let active = if status.is_running() { request_id } else { None };
                self.adopt_status(status, active);
                Ok(changes)
            }
            ServerMessage::ChatEvent(envelope) => Ok(self.apply(&envelope)?.into_iter().collect()),
            ServerMessage::ChatStarted { request_id } => {
                self.adopt_status(ChatStatus::Running, Some(request_id));
                Ok(Vec::new())
            }
            ServerMessage::ChatFinished { request_id, status } => {
                let tracked = self.active_request.as_deref();
                if tracked.is_none() || tracked == Some(request_id.as_str()) {
                    self.adopt_status(status, None);
                }
                Ok(Vec::new())
            }
            ServerMessage::Busy { current_request_id } => {
                self.adopt_status(ChatStatus::Running, Some(current_request_id.clone()));
                Err(ProtocolError::Busy { current_request_id })
            }
            ServerMessage::ProtocolError { message } => Err(ProtocolError::Remote(message)),
        }
    }

    fn apply(&mut self, envelope: &ChatEventEnvelope) -> Result<Option<ConversationChange>, ProtocolError> {
        if envelope.event_id <= self.last_event_id {
            return Ok(None);
        }
        let expected = self.last_event_id + 1;
        if envelope.event_id != expected {
            return Err(ProtocolError::EventGap {
                expected,
                received: envelope.event_id,
            });
        }

        let reduction = reduce(
            std::mem::take(&mut self.snapshot),
            &envelope.event,
            envelope.created_at,
        );
        self.snapshot = reduction.snapshot;
        self.last_event_id = envelope.event_id;
        Ok(reduction.change)
    }

    // Server frames are authoritative; the local machine just mirrors them.
    fn adopt_status(&mut self, status: ChatStatus, active_request: Option<String>) {
        if self.machine.status() != status {
            self.machine = StatusMachine::with_status(status);
        }
        self.active_request = active_request;
    }
}
