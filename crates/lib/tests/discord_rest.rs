//! Integration test: DiscordChannel REST calls (typing, reply, edit) against a fake API on a free port.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{patch, post},
    Json, Router,
};
use lib::channels::{ChannelHandle, DiscordChannel, MessageRef};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

type Calls = Arc<Mutex<Vec<(String, Value)>>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bot test-token")
}

async fn typing(
    State(calls): State<Calls>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    calls
        .lock()
        .unwrap()
        .push((format!("typing {}", channel_id), Value::Null));
    StatusCode::NO_CONTENT
}

async fn create_message(
    State(calls): State<Calls>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    calls
        .lock()
        .unwrap()
        .push((format!("create {}", channel_id), body));
    Ok(Json(json!({ "id": "900", "channel_id": channel_id })))
}

async fn edit_message(
    State(calls): State<Calls>,
    Path((channel_id, message_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    if message_id == "missing" {
        return StatusCode::NOT_FOUND;
    }
    calls
        .lock()
        .unwrap()
        .push((format!("edit {} {}", channel_id, message_id), body));
    StatusCode::OK
}

async fn spawn_fake_discord(calls: Calls) -> String {
    let app = Router::new()
        .route("/channels/:channel_id/typing", post(typing))
        .route("/channels/:channel_id/messages", post(create_message))
        .route(
            "/channels/:channel_id/messages/:message_id",
            patch(edit_message),
        )
        .with_state(calls);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake discord");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn typing_reply_and_edit_hit_the_rest_api() {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let base = spawn_fake_discord(calls.clone()).await;
    let discord = DiscordChannel::new("test-token".to_string()).with_api_base(base);

    discord.send_typing("42").await.expect("typing");
    let placeholder = ChannelHandle::reply(&discord, "42", "7", "Pensando...")
        .await
        .expect("reply");
    assert_eq!(
        placeholder,
        MessageRef {
            conversation_id: "42".to_string(),
            message_id: "900".to_string()
        }
    );
    ChannelHandle::edit_message(&discord, &placeholder, "Olá!")
        .await
        .expect("edit");

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls[0].0, "typing 42");
    assert_eq!(calls[1].0, "create 42");
    assert_eq!(calls[1].1["content"], "Pensando...");
    assert_eq!(calls[1].1["message_reference"]["message_id"], "7");
    assert_eq!(calls[2].0, "edit 42 900");
    assert_eq!(calls[2].1, json!({ "content": "Olá!" }));
}

#[tokio::test]
async fn rest_errors_are_reported() {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let base = spawn_fake_discord(calls.clone()).await;
    let wrong_token = DiscordChannel::new("other".to_string()).with_api_base(base.clone());
    let err = wrong_token.send_typing("1").await.unwrap_err();
    assert!(err.contains("401"), "unexpected error: {}", err);

    let discord = DiscordChannel::new("test-token".to_string()).with_api_base(base);
    let missing = MessageRef {
        conversation_id: "1".to_string(),
        message_id: "missing".to_string(),
    };
    let err = discord.edit_message(&missing, "x").await.unwrap_err();
    assert!(err.contains("404"), "unexpected error: {}", err);
    assert!(calls.lock().unwrap().is_empty());
}
