use actix_web::{web, HttpResponse, Responder};

use crate::handlers::error_response;
use crate::state::AppState;

/// Aborts whatever runs in the conversation. Always succeeds; the frame
/// says whether something was stopped.
pub async fn handler(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let conversation_id = path.into_inner();
    log::info!("[{}] Stop request received", conversation_id);

    match state.hub.abort(&conversation_id, None).await {
        Ok(frame) => HttpResponse::Ok().json(frame),
        Err(error) => error_response(&conversation_id, error),
    }
}
