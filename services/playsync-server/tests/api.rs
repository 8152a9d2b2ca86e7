//! HTTP API tests driving the router in-process

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use playsync_core::{EndpointChannel, SyncEngine, SyncSettings};
use playsync_server::{
    api::{build_router, AppState},
    config::Config,
    hub::ChannelHub,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Router, Arc<SyncEngine>) {
    let (router, engine, _) = app_with_hub();
    (router, engine)
}

fn app_with_hub() -> (Router, Arc<SyncEngine>, Arc<ChannelHub>) {
    let engine = Arc::new(SyncEngine::new(SyncSettings::default()).unwrap());
    let hub = Arc::new(ChannelHub::new());
    let state = AppState::new(engine.clone(), hub.clone(), Arc::new(Config::default()));
    (build_router(state), engine, hub)
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (router, _) = app();
    let (status, body) = call(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn test_register_and_list_endpoints() {
    let (router, engine) = app();

    let (status, body) = call(
        &router,
        Method::POST,
        "/api/endpoints",
        Some(json!({"id": "left", "group": "wall", "offset_ms": 250})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "left");
    assert_eq!(body["group"], "wall");
    assert_eq!(body["connected"], false);

    let (status, body) = call(&router, Method::GET, "/api/endpoints", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(engine.endpoint("left").unwrap().offset_ms, 250);
}

#[tokio::test]
async fn test_registration_errors() {
    let (router, _) = app();
    call(&router, Method::POST, "/api/endpoints", Some(json!({"id": "a"}))).await;

    let (status, body) = call(&router, Method::POST, "/api/endpoints", Some(json!({"id": "a"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = call(&router, Method::POST, "/api/endpoints", Some(json!({"id": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = call(&router, Method::DELETE, "/api/endpoints/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_group_offset_and_remove() {
    let (router, engine) = app();
    call(&router, Method::POST, "/api/endpoints", Some(json!({"id": "a"}))).await;

    let (status, body) = call(&router, Method::PUT, "/api/endpoints/a/group", Some(json!({"group": "B"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group"], "B");

    let (status, body) = call(&router, Method::PUT, "/api/endpoints/a/offset", Some(json!({"offset_ms": -500}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["offset_ms"], -500);

    let (status, _) = call(&router, Method::PUT, "/api/endpoints/a/group", Some(json!({"group": null}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(engine.endpoint("a").unwrap().group, None);

    let (status, _) = call(&router, Method::DELETE, "/api/endpoints/a", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(engine.endpoint_count(), 0);
}

#[tokio::test]
async fn test_delete_disconnects_attached_player() {
    let (router, engine, hub) = app_with_hub();
    call(&router, Method::POST, "/api/endpoints", Some(json!({"id": "a", "group": "wall"}))).await;

    let channel = hub.channel_for("a");
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    channel.attach(tx);
    assert!(engine.endpoint("a").unwrap().is_available());

    let (status, _) = call(&router, Method::DELETE, "/api/endpoints/a", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!channel.is_available());
    assert_eq!(rx.recv().await, None);
    assert!(hub.is_empty());

    // Late frames from the old connection are dropped
    assert!(!engine.ingest_raw("a", r#"{"event":"status","currentTime":3.0,"playerState":1}"#));
    assert!(engine.state("a").is_none());

    // Re-registering starts from a fresh channel
    let (status, body) = call(&router, Method::POST, "/api/endpoints", Some(json!({"id": "a"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["connected"], false);
    assert!(!Arc::ptr_eq(&channel, &hub.channel_for("a")));
}

#[tokio::test]
async fn test_settings_patch() {
    let (router, engine) = app();

    let (status, body) = call(
        &router,
        Method::PATCH,
        "/api/settings",
        Some(json!({"tolerance_ms": 150, "leader_policy": "longest-playing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tolerance_ms"], 150);
    assert_eq!(body["leader_policy"], "longest-playing");
    assert_eq!(engine.settings().tolerance_ms, 150);

    let (status, _) = call(&router, Method::PATCH, "/api/settings", Some(json!({"sync_frequency_hz": 0.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(engine.settings().sync_frequency_hz, 2.0);

    let (status, body) = call(&router, Method::GET, "/api/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback_mode"], "mute-and-continue");
}

#[tokio::test]
async fn test_playback_controls() {
    let (router, _) = app();
    call(&router, Method::POST, "/api/endpoints", Some(json!({"id": "a"}))).await;

    // No transport attached: commands are silently dropped
    let (status, body) = call(&router, Method::POST, "/api/playback/play", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivered"], 0);

    let (status, _) = call(&router, Method::POST, "/api/playback/volume", Some(json!({"volume": 500}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&router, Method::POST, "/api/playback/toggle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["playing"], true);

    let (status, body) = call(&router, Method::POST, "/api/playback/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_audio_focus() {
    let (router, engine) = app();
    call(&router, Method::POST, "/api/endpoints", Some(json!({"id": "a"}))).await;

    let (status, body) = call(&router, Method::POST, "/api/playback/focus", Some(json!({"endpoint_id": "a"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["audio_focus"], "a");
    assert_eq!(engine.audio_focus().as_deref(), Some("a"));

    let (status, _) = call(&router, Method::POST, "/api/playback/focus", Some(json!({"endpoint_id": "ghost"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_state_and_diagnostics() {
    let (router, engine) = app();
    call(
        &router,
        Method::POST,
        "/api/endpoints",
        Some(json!({"id": "a", "group": "wall", "metadata": {"cell_col": 2, "cell_row": 1}})),
    )
    .await;
    engine.ingest_raw("a", r#"{"event":"status","currentTime":5.0,"playerState":1}"#);
    engine.tick();

    let (status, body) = call(&router, Method::GET, "/api/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"][0]["id"], "a");
    assert_eq!(body["endpoints"][0]["metadata"]["cell_col"], 2);
    assert_eq!(body["settings"]["tolerance_ms"], 300);

    let (status, body) = call(&router, Method::GET, "/api/diagnostics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticks"], 1);
    assert_eq!(body["groups"][0]["leader"], "a");
    assert_eq!(body["endpoints"][0]["status"], "playing");
}
