use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

pub async fn handler(state: web::Data<AppState>) -> impl Responder {
    let models = match state.llm.list_models().await {
        Ok(models) => models,
        Err(error) => {
            log::warn!("Failed to list models: {}", error);
            Vec::new()
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "models": models,
    }))
}
