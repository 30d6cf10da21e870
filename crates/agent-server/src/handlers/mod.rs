pub mod conversations;
pub mod events;
pub mod health;
pub mod messages;
pub mod stop;

use actix_web::HttpResponse;
use agent_core::storage::StorageError;
use agent_core::AgentError;
use chat_state::{ProtocolError, ServerMessage};

/// Maps a failed operation to an HTTP response.
pub(crate) fn error_response(conversation_id: &str, error: AgentError) -> HttpResponse {
    match &error {
        AgentError::Storage(StorageError::InvalidId(_) | StorageError::InvalidCursor(_)) => {
            log::warn!("[{}] Bad request: {}", conversation_id, error);
            HttpResponse::BadRequest().json(serde_json::json!({ "error": error.to_string() }))
        }
        AgentError::ConversationNotFound(_) => {
            HttpResponse::NotFound().json(serde_json::json!({ "error": error.to_string() }))
        }
        AgentError::Protocol(stale @ ProtocolError::StaleSnapshot { .. }) => {
            HttpResponse::Conflict().json(ServerMessage::ProtocolError {
                message: stale.to_string(),
            })
        }
        AgentError::Protocol(protocol) => protocol_error(protocol.to_string()),
        _ => {
            log::error!("[{}] Request failed: {}", conversation_id, error);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": error.to_string() }))
        }
    }
}

/// `protocol_error` frame for a malformed client message.
pub(crate) fn protocol_error(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ServerMessage::ProtocolError {
        message: message.into(),
    })
}
