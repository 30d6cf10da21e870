//! Server-side session bookkeeping for one conversation
//!
//! Owns the event id counter and the request status. The transport wraps a
//! `ChatSession` with its broadcast channel and cancellation token; this type
//! stays free of runtime concerns.

use chrono::{DateTime, Utc};

use crate::error::ProtocolError;
use crate::event::StreamEvent;
use crate::machine::{ChatStatus, StatusEvent, StatusMachine};
use crate::protocol::{ChatEventEnvelope, EventId, ServerMessage};

/// What an `abort` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortOutcome {
    /// The running request was moved to `Aborted`.
    Aborted { request_id: String },
    /// Nothing (matching) was running.
    NotRunning,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    conversation_id: String,
    machine: StatusMachine,
    active_request: Option<String>,
    last_request: Option<String>,
    last_event_id: EventId,
}

impl ChatSession {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self::resume(conversation_id, 0)
    }

    /// Continues the event id sequence of a persisted conversation.
    pub fn resume(conversation_id: impl Into<String>, last_event_id: EventId) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            machine: StatusMachine::new(),
            active_request: None,
            last_request: None,
            last_event_id,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn status(&self) -> ChatStatus {
        self.machine.status()
    }

    pub fn active_request(&self) -> Option<&str> {
        self.active_request.as_deref()
    }

    pub fn last_event_id(&self) -> EventId {
        self.last_event_id
    }

    pub fn is_active(&self, request_id: &str) -> bool {
        self.active_request.as_deref() == Some(request_id)
    }

    /// Claims the request slot, or reports the request holding it.
    pub fn start(&mut self, request_id: &str) -> Result<(), ProtocolError> {
        if let Some(current) = &self.active_request {
            return Err(ProtocolError::Busy {
                current_request_id: current.clone(),
            });
        }

        self.machine.handle_event(StatusEvent::RequestStarted {
            request_id: request_id.to_string(),
        })?;
        self.active_request = Some(request_id.to_string());
        self.last_request = Some(request_id.to_string());
        log::info!(
            "[{}] Request {} started",
            self.conversation_id,
            request_id
        );
        Ok(())
    }

    /// Assigns the next event id to an event of the active request.
    ///
    /// Events of a request that is no longer active (aborted, finished) are
    /// refused so late output never lands after a terminal status.
    pub fn record(
        &mut self,
        request_id: &str,
        event: StreamEvent,
        created_at: DateTime<Utc>,
    ) -> Option<ChatEventEnvelope> {
        if !self.is_active(request_id) {
            log::debug!(
                "[{}] Dropping {} event of inactive request {}",
                self.conversation_id,
                event.kind(),
                request_id
            );
            return None;
        }

        self.last_event_id += 1;
        Some(ChatEventEnvelope {
            event_id: self.last_event_id,
            request_id: request_id.to_string(),
            created_at,
            event,
        })
    }

    /// Takes back the id of the last recorded event when it never made it
    /// into the event log, so the next event reuses it.
    pub fn unrecord(&mut self, event_id: EventId) {
        if event_id == self.last_event_id {
            self.last_event_id = event_id.saturating_sub(1);
        }
    }

    /// Moves the active request to a terminal status.
    ///
    /// Returns the `chat_finished` frame the first time only; a request that
    /// was already aborted yields `None`.
    pub fn finish(&mut self, request_id: &str, status: ChatStatus) -> Option<ServerMessage> {
        if !self.is_active(request_id) {
            return None;
        }

        let event = match status {
            ChatStatus::Completed => StatusEvent::RequestCompleted,
            ChatStatus::Aborted => StatusEvent::AbortRequested,
            ChatStatus::Error => StatusEvent::RequestFailed {
                error: "request failed".to_string(),
            },
            ChatStatus::Idle | ChatStatus::Running => {
                log::warn!(
                    "[{}] Ignoring non-terminal finish status {}",
                    self.conversation_id,
                    status
                );
                return None;
            }
        };

        if let Err(e) = self.machine.handle_event(event) {
            log::warn!("[{}] {}", self.conversation_id, e);
            return None;
        }
        self.active_request = None;
        log::info!(
            "[{}] Request {} finished: {}",
            self.conversation_id,
            request_id,
            status
        );

        Some(ServerMessage::ChatFinished {
            request_id: request_id.to_string(),
            status,
        })
    }

    /// Aborts the running request. Idempotent when nothing runs or
    /// `request_id` names another request.
    pub fn abort(&mut self, request_id: Option<&str>) -> AbortOutcome {
        let Some(active) = self.active_request.clone() else {
            return AbortOutcome::NotRunning;
        };
        if request_id.is_some_and(|id| id != active) {
            return AbortOutcome::NotRunning;
        }

        match self.finish(&active, ChatStatus::Aborted) {
            Some(_) => AbortOutcome::Aborted { request_id: active },
            None => AbortOutcome::NotRunning,
        }
    }

    /// Frame describing the session plus the given replayed events.
    pub fn sync_response(&self, events: Vec<ChatEventEnvelope>) -> ServerMessage {
        let request_id = match self.status() {
            ChatStatus::Idle => None,
            ChatStatus::Running => self.active_request.clone(),
            _ => self.last_request.clone(),
        };
        ServerMessage::SyncResponse {
            status: self.status(),
            request_id,
            events,
        }
    }
}
