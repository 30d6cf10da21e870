use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::io;

use chat_core::Config;

use crate::handlers;
use crate::state::AppState;

/// Routes under `/api/v1`.
pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/messages", web::post().to(handlers::messages::handler))
            .route(
                "/events/{conversation_id}",
                web::get().to(handlers::events::handler),
            )
            .route(
                "/stop/{conversation_id}",
                web::post().to(handlers::stop::handler),
            )
            .route(
                "/conversations",
                web::get().to(handlers::conversations::list),
            )
            .route(
                "/conversations/{conversation_id}",
                web::get().to(handlers::conversations::get),
            )
            .route(
                "/conversations/{conversation_id}",
                web::delete().to(handlers::conversations::delete),
            )
            .route(
                "/conversations/{conversation_id}/outline",
                web::get().to(handlers::conversations::outline),
            )
            .route("/health", web::get().to(handlers::health::handler)),
    );
}

pub async fn run_server(config: Config) -> io::Result<()> {
    let state = AppState::from_config(&config).await?;
    run_server_with_state(config.port, state).await
}

pub async fn run_server_with_state(port: u16, state: AppState) -> io::Result<()> {
    log::info!("Starting server on port {}", port);
    let state = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await
}
