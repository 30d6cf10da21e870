use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use agent_core::storage::ListQuery;
use agent_core::AgentError;
use chat_core::build_outline_tree;

use crate::handlers::error_response;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

pub async fn list(state: web::Data<AppState>, params: web::Query<ListParams>) -> impl Responder {
    let params = params.into_inner();
    let query = ListQuery {
        limit: params.limit,
        cursor: params.cursor,
    };

    match state.storage.list(&query).await {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(error) => error_response("list", error.into()),
    }
}

/// Saved conversation, including its snapshot and event watermark.
///
/// Clients resume by loading this and then syncing from `lastEventId`.
pub async fn get(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let conversation_id = path.into_inner();
    match state.storage.get(&conversation_id).await {
        Ok(Some(conversation)) => HttpResponse::Ok().json(conversation),
        Ok(None) => error_response(
            &conversation_id,
            AgentError::ConversationNotFound(conversation_id.clone()),
        ),
        Err(error) => error_response(&conversation_id, error.into()),
    }
}

/// Outline of the saved snapshot.
pub async fn outline(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let conversation_id = path.into_inner();
    match state.storage.get(&conversation_id).await {
        Ok(Some(conversation)) => {
            let snapshot = &conversation.snapshot;
            HttpResponse::Ok().json(build_outline_tree(&snapshot.messages, snapshot.latest_root_id))
        }
        Ok(None) => error_response(
            &conversation_id,
            AgentError::ConversationNotFound(conversation_id.clone()),
        ),
        Err(error) => error_response(&conversation_id, error.into()),
    }
}

/// Aborts any running request, then deletes the conversation and its log.
pub async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let conversation_id = path.into_inner();
    log::info!("[{}] Delete requested", conversation_id);

    match state.hub.delete(&conversation_id).await {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({
            "deleted": true,
            "conversationId": conversation_id,
        })),
        Ok(false) => error_response(
            &conversation_id,
            AgentError::ConversationNotFound(conversation_id.clone()),
        ),
        Err(error) => error_response(&conversation_id, error),
    }
}
