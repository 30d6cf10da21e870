use chat_core::TreeError;
use thiserror::Error;

use crate::machine::TransitionError;
use crate::protocol::EventId;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid tree snapshot: {0}")]
    Tree(#[from] TreeError),

    #[error("Conversation is busy with request {current_request_id}")]
    Busy { current_request_id: String },

    #[error("Snapshot is behind the conversation at event {last_event_id}; sync first")]
    StaleSnapshot { last_event_id: EventId },

    #[error("Event gap: expected event {expected}, received {received}")]
    EventGap { expected: EventId, received: EventId },

    #[error("Server reported a protocol error: {0}")]
    Remote(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}
