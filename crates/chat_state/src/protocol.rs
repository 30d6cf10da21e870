//! Session protocol frames
//!
//! Client and server exchange JSON objects tagged by `type`. Event ids are
//! per conversation, start at 1 and are assigned when the event is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chat_core::{create_linear_messages, validate_blocks, MessageInput, Role, TreeSnapshot};

use crate::error::ProtocolError;
use crate::event::StreamEvent;
use crate::machine::ChatStatus;

pub type EventId = u64;

/// A persisted stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEventEnvelope {
    pub event_id: EventId,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub event: StreamEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Sync {
        conversation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_event_id: Option<EventId>,
    },
    ChatRequest {
        request_id: String,
        conversation_id: String,
        /// Role of the message to generate; always assistant.
        role: Role,
        /// Flat history for clients without a tree; used when the snapshot is empty.
        #[serde(default)]
        conversation_history: Vec<MessageInput>,
        #[serde(default)]
        tree_snapshot: TreeSnapshot,
    },
    Abort {
        conversation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ClientMessage {
    /// Parses one client frame.
    pub fn from_json(raw: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(raw).map_err(ProtocolError::from)
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            ClientMessage::Sync {
                conversation_id, ..
            }
            | ClientMessage::ChatRequest {
                conversation_id, ..
            }
            | ClientMessage::Abort {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Validated contents of a `chat_request`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub request_id: String,
    pub conversation_id: String,
    pub snapshot: TreeSnapshot,
}

impl ChatRequest {
    /// Checks a `chat_request` once at ingress.
    ///
    /// The snapshot must be structurally sound, every message must carry only
    /// blocks its role allows, and the active path must end on a user turn
    /// or an assistant message opened for regeneration.
    pub fn from_message(message: ClientMessage) -> Result<Self, ProtocolError> {
        let ClientMessage::ChatRequest {
            request_id,
            conversation_id,
            role,
            conversation_history,
            tree_snapshot,
        } = message
        else {
            return Err(ProtocolError::InvalidRequest(
                "expected a chat_request".to_string(),
            ));
        };

        if request_id.trim().is_empty() || conversation_id.trim().is_empty() {
            return Err(ProtocolError::InvalidRequest(
                "requestId and conversationId are required".to_string(),
            ));
        }
        if role != Role::Assistant {
            return Err(ProtocolError::InvalidRequest(
                "only assistant turns can be requested".to_string(),
            ));
        }

        let snapshot = if tree_snapshot.is_empty() && !conversation_history.is_empty() {
            for input in &conversation_history {
                validate_blocks(input.role, &input.blocks)?;
            }
            create_linear_messages(conversation_history)
        } else {
            tree_snapshot
        };
        snapshot.validate()?;

        if snapshot.last_message().is_none() {
            return Err(ProtocolError::InvalidRequest(
                "conversation has no messages".to_string(),
            ));
        }

        Ok(Self {
            request_id,
            conversation_id,
            snapshot,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    SyncResponse {
        status: ChatStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        events: Vec<ChatEventEnvelope>,
    },
    ChatEvent(ChatEventEnvelope),
    ChatStarted {
        request_id: String,
    },
    ChatFinished {
        request_id: String,
        status: ChatStatus,
    },
    Busy {
        current_request_id: String,
    },
    ProtocolError {
        message: String,
    },
}

impl ServerMessage {
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::from)
    }

    /// Event id carried by the frame, if any.
    pub fn event_id(&self) -> Option<EventId> {
        match self {
            ServerMessage::ChatEvent(envelope) => Some(envelope.event_id),
            ServerMessage::SyncResponse { events, .. } => events.last().map(|e| e.event_id),
            _ => None,
        }
    }
}

/// Events strictly after `last_event_id`, in id order.
pub fn events_after(events: &[ChatEventEnvelope], last_event_id: Option<EventId>) -> Vec<ChatEventEnvelope> {
    let cursor = last_event_id.unwrap_or(0);
    let mut selected: Vec<ChatEventEnvelope> = events
        .iter()
        .filter(|envelope| envelope.event_id > cursor)
        .cloned()
        .collect();
    selected.sort_by_key(|envelope| envelope.event_id);
    selected.dedup_by_key(|envelope| envelope.event_id);
    selected
}
