use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use chat_state::{EventId, ServerMessage};

use crate::handlers::error_response;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub last_event_id: Option<EventId>,
}

/// SSE subscription: the replay as a `sync_response`, then live frames.
///
/// Live frames at or below the highest id already sent are skipped. A
/// lagging subscriber is disconnected so it resyncs from its cursor.
pub async fn handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<EventsQuery>,
    req: HttpRequest,
) -> impl Responder {
    let conversation_id = path.into_inner();
    let last_event_id = query.last_event_id.or_else(|| last_event_id_header(&req));
    log::debug!(
        "[{}] Events subscription requested after {:?}",
        conversation_id,
        last_event_id
    );

    let (replay, mut receiver) = match state.hub.subscribe(&conversation_id, last_event_id).await {
        Ok(subscription) => subscription,
        Err(error) => return error_response(&conversation_id, error),
    };
    let mut last_sent = replay
        .event_id()
        .unwrap_or(0)
        .max(last_event_id.unwrap_or(0));

    HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONNECTION, "keep-alive"))
        .streaming(async_stream::stream! {
            if let Some(bytes) = sse_frame(&replay) {
                yield Ok::<_, actix_web::Error>(bytes);
            }

            loop {
                match receiver.recv().await {
                    Ok(frame) => {
                        if let Some(event_id) = frame.event_id() {
                            if event_id <= last_sent {
                                continue;
                            }
                            last_sent = event_id;
                        }
                        if let Some(bytes) = sse_frame(&frame) {
                            yield Ok::<_, actix_web::Error>(bytes);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "[{}] Subscriber lagged by {} frames, closing stream",
                            conversation_id,
                            skipped
                        );
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
}

fn last_event_id_header(req: &HttpRequest) -> Option<EventId> {
    req.headers()
        .get("Last-Event-ID")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// `id:` carries the event id when the frame has one.
pub fn sse_frame(frame: &ServerMessage) -> Option<web::Bytes> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(error) => {
            log::error!("Failed to serialize server frame: {}", error);
            return None;
        }
    };

    let data = match frame.event_id() {
        Some(event_id) => format!("id: {}\ndata: {}\n\n", event_id, json),
        None => format!("data: {}\n\n", json),
    };
    Some(web::Bytes::from(data))
}
