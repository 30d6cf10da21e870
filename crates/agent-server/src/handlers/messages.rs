use actix_web::{web, HttpResponse, Responder};

use chat_state::{ChatRequest, ClientMessage, ServerMessage};

use crate::handlers::{error_response, protocol_error};
use crate::state::AppState;

/// One client frame in, one server frame out.
pub async fn handler(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let message = match ClientMessage::from_json(&body) {
        Ok(message) => message,
        Err(error) => {
            log::warn!("Rejecting malformed client frame: {}", error);
            return protocol_error(error.to_string());
        }
    };
    let conversation_id = message.conversation_id().to_string();

    let result = match message {
        ClientMessage::Sync {
            conversation_id,
            last_event_id,
        } => {
            log::debug!("[{}] Sync from {:?}", conversation_id, last_event_id);
            state.hub.sync(&conversation_id, last_event_id).await
        }
        ClientMessage::Abort {
            conversation_id,
            request_id,
        } => {
            log::info!("[{}] Abort requested", conversation_id);
            state.hub.abort(&conversation_id, request_id.as_deref()).await
        }
        request @ ClientMessage::ChatRequest { .. } => match ChatRequest::from_message(request) {
            Ok(request) => state.start_chat(request).await,
            Err(error) => {
                log::warn!("[{}] Invalid chat_request: {}", conversation_id, error);
                return protocol_error(error.to_string());
            }
        },
    };

    match result {
        Ok(frame @ ServerMessage::Busy { .. }) => HttpResponse::Conflict().json(frame),
        Ok(frame) => HttpResponse::Ok().json(frame),
        Err(error) => error_response(&conversation_id, error),
    }
}
