/// HTTP API tests for the session protocol
///
/// The app runs in-process with memory storage and a scripted provider, so
/// every request here goes through the real handlers and session hub.
use std::sync::Arc;
use std::time::Duration;

use actix_http::Request;
use actix_web::{
    dev::{Service, ServiceResponse},
    test, web, App, Error,
};
use serde_json::{json, Value};

use agent_core::storage::MemoryStorage;
use agent_core::tools::NoopToolExecutor;
use agent_llm::{LLMChunk, ScriptedProvider, ScriptedTurn};
use agent_loop::AgentLoopConfig;
use agent_server::{app_config, AppState};
use chat_core::{Block, Role, TreeSnapshot};

fn reply_turn(parts: &[&str]) -> ScriptedTurn {
    let mut chunks: Vec<LLMChunk> = parts
        .iter()
        .map(|part| LLMChunk::Token(part.to_string()))
        .collect();
    chunks.push(LLMChunk::Done);
    ScriptedTurn::Chunks(chunks)
}

async fn setup_test_app(
    provider: ScriptedProvider,
) -> impl Service<Request, Response = ServiceResponse, Error = Error> {
    let state = AppState::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(provider),
        Arc::new(NoopToolExecutor),
        AgentLoopConfig::default(),
    );
    test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(app_config),
    )
    .await
}

fn chat_request(conversation_id: &str, request_id: &str, text: &str) -> Value {
    json!({
        "type": "chat_request",
        "requestId": request_id,
        "conversationId": conversation_id,
        "role": "assistant",
        "conversationHistory": [
            { "role": "user", "blocks": [{ "type": "content", "text": text }] }
        ]
    })
}

async fn post_message(
    app: &impl Service<Request, Response = ServiceResponse, Error = Error>,
    body: Value,
) -> (u16, Value) {
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .set_json(body)
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

async fn sync(
    app: &impl Service<Request, Response = ServiceResponse, Error = Error>,
    conversation_id: &str,
    last_event_id: u64,
) -> Value {
    let (status, body) = post_message(
        app,
        json!({
            "type": "sync",
            "conversationId": conversation_id,
            "lastEventId": last_event_id
        }),
    )
    .await;
    assert_eq!(status, 200);
    body
}

async fn wait_until_settled(
    app: &impl Service<Request, Response = ServiceResponse, Error = Error>,
    conversation_id: &str,
) -> Value {
    for _ in 0..200 {
        let frame = sync(app, conversation_id, 0).await;
        if frame["status"] != "running" {
            return frame;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request in {conversation_id} never settled");
}

#[actix_web::test]
async fn test_health_endpoint() {
    let app = setup_test_app(ScriptedProvider::new([])).await;
    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["models"], json!([]));
}

#[actix_web::test]
async fn test_chat_request_streams_and_persists() {
    let app = setup_test_app(ScriptedProvider::new([reply_turn(&["Hello", " there"])])).await;

    let (status, started) = post_message(&app, chat_request("conv-1", "req-1", "hi")).await;
    assert_eq!(status, 200);
    assert_eq!(started, json!({ "type": "chat_started", "requestId": "req-1" }));

    let settled = wait_until_settled(&app, "conv-1").await;
    assert_eq!(settled["status"], "completed");
    assert_eq!(settled["requestId"], "req-1");

    let events = settled["events"].as_array().unwrap();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["event"]["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["conversation_created", "content", "content"]);
    let ids: Vec<u64> = events.iter().map(|e| e["eventId"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let after_two = sync(&app, "conv-1", 2).await;
    let replayed = after_two["events"].as_array().unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0]["eventId"], 3);

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations/conv-1")
        .to_request();
    let conversation: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(conversation["title"], "hi");
    assert_eq!(conversation["lastEventId"], 3);
    let messages = conversation["snapshot"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["blocks"][0]["text"], "Hello there");
}

#[actix_web::test]
async fn test_second_request_while_running_is_busy() {
    let provider = ScriptedProvider::new([reply_turn(&["a", "b", "c", "d", "e"])])
        .with_chunk_delay(Duration::from_millis(100));
    let app = setup_test_app(provider).await;

    let (status, _) = post_message(&app, chat_request("conv-2", "req-1", "one")).await;
    assert_eq!(status, 200);

    let (status, busy) = post_message(&app, chat_request("conv-2", "req-2", "two")).await;
    assert_eq!(status, 409);
    assert_eq!(busy, json!({ "type": "busy", "currentRequestId": "req-1" }));

    let (status, finished) = post_message(
        &app,
        json!({ "type": "abort", "conversationId": "conv-2", "requestId": "req-1" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(
        finished,
        json!({ "type": "chat_finished", "requestId": "req-1", "status": "aborted" })
    );

    // A second abort is a no-op describing the session.
    let (_, again) = post_message(
        &app,
        json!({ "type": "abort", "conversationId": "conv-2" }),
    )
    .await;
    assert_eq!(again["type"], "sync_response");
    assert_eq!(again["status"], "aborted");

    // A fresh linear history would drop the first turn.
    let (status, stale) = post_message(&app, chat_request("conv-2", "req-3", "three")).await;
    assert_eq!(status, 409);
    assert_eq!(stale["type"], "protocol_error");

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations/conv-2")
        .to_request();
    let conversation: Value = test::call_and_read_body_json(&app, req).await;
    let snapshot: TreeSnapshot = serde_json::from_value(conversation["snapshot"].clone()).unwrap();
    let (snapshot, _) = snapshot.add_message(Role::User, vec![Block::content("three")], None);

    let (status, restarted) = post_message(
        &app,
        json!({
            "type": "chat_request",
            "requestId": "req-4",
            "conversationId": "conv-2",
            "role": "assistant",
            "treeSnapshot": snapshot
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(restarted["type"], "chat_started");
}

#[actix_web::test]
async fn test_stop_endpoint_aborts_running_request() {
    let provider = ScriptedProvider::new([reply_turn(&["slow", "reply"])])
        .with_chunk_delay(Duration::from_millis(200));
    let app = setup_test_app(provider).await;
    post_message(&app, chat_request("conv-3", "req-1", "hi")).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/stop/conv-3")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["type"], "chat_finished");
    assert_eq!(body["status"], "aborted");

    let settled = wait_until_settled(&app, "conv-3").await;
    assert_eq!(settled["status"], "aborted");
}

#[actix_web::test]
async fn test_malformed_frames_get_protocol_errors() {
    let app = setup_test_app(ScriptedProvider::new([])).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .set_payload("{not json")
        .insert_header(("content-type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["type"], "protocol_error");

    let mut wrong_role = chat_request("conv-4", "req-1", "hi");
    wrong_role["role"] = json!("user");
    let (status, body) = post_message(&app, wrong_role).await;
    assert_eq!(status, 400);
    assert_eq!(body["type"], "protocol_error");

    let (status, _) = post_message(&app, chat_request("../bad", "req-1", "hi")).await;
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn test_list_and_delete_conversations() {
    let app = setup_test_app(ScriptedProvider::new([reply_turn(&["ok"])])).await;
    post_message(&app, chat_request("conv-a", "req-1", "first")).await;
    wait_until_settled(&app, "conv-a").await;
    post_message(&app, chat_request("conv-b", "req-2", "second")).await;
    wait_until_settled(&app, "conv-b").await;

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations?limit=1")
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["conversations"].as_array().unwrap().len(), 1);
    assert_eq!(page["conversations"][0]["id"], "conv-b");
    assert!(page["nextCursor"].is_string());

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations/conv-a/outline")
        .to_request();
    let outline: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(outline["roots"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri("/api/v1/conversations/conv-a")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations/conv-a")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_events_endpoint_is_sse() {
    let app = setup_test_app(ScriptedProvider::new([])).await;
    let req = test::TestRequest::get()
        .uri("/api/v1/events/conv-5?lastEventId=0")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let content_type = resp.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/event-stream"));
}
