//! Endpoint WebSocket tests against a server on an ephemeral port

use futures::{SinkExt, StreamExt};
use playsync_core::{SyncEngine, SyncSettings};
use playsync_server::{
    api::{build_router, AppState},
    config::Config,
    hub::ChannelHub,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve() -> (SocketAddr, Arc<SyncEngine>) {
    let engine = Arc::new(SyncEngine::new(SyncSettings::default()).unwrap());
    let state = AppState::new(
        engine.clone(),
        Arc::new(ChannelHub::new()),
        Arc::new(Config::default()),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    (addr, engine)
}

async fn connect(addr: SocketAddr, id: &str) -> Client {
    let url = format!("ws://{}/ws/endpoints/{}", addr, id);
    let (ws, _) = connect_async(&url).await.expect("Failed to connect");
    ws
}

/// Next text frame, decoded
async fn next_json(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// True once the server side has dropped the connection
async fn closed(ws: &mut Client) -> bool {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn expect_snapshot_request(ws: &mut Client) {
    assert_eq!(next_json(ws).await, json!({"event": "listening"}));
    assert_eq!(
        next_json(ws).await,
        json!({"event": "command", "func": "getPlayerState", "args": []})
    );
    assert_eq!(
        next_json(ws).await,
        json!({"event": "command", "func": "getCurrentTime", "args": []})
    );
}

#[tokio::test]
async fn test_unknown_endpoint_registers_ungrouped() {
    let (addr, engine) = serve().await;
    let mut ws = connect(addr, "lobby").await;

    expect_snapshot_request(&mut ws).await;
    let endpoint = engine.endpoint("lobby").unwrap();
    assert_eq!(endpoint.group, None);
    assert!(endpoint.is_available());
}

#[tokio::test]
async fn test_frames_flow_both_ways() {
    let (addr, engine) = serve().await;
    let mut ws = connect(addr, "a").await;
    expect_snapshot_request(&mut ws).await;

    ws.send(Message::Text(
        r#"{"event":"infoDelivery","info":{"currentTime":12.5,"playerState":1}}"#.into(),
    ))
    .await
    .unwrap();
    eventually(|| engine.state("a").is_some()).await;
    let state = engine.state("a").unwrap();
    assert_eq!(state.position, Some(12.5));
    assert!(state.is_playing());

    assert_eq!(engine.set_volume_all(500), 1);
    assert_eq!(
        next_json(&mut ws).await,
        json!({"event": "command", "func": "setVolume", "args": [100]})
    );
}

#[tokio::test]
async fn test_disconnect_leaves_inert_endpoint() {
    let (addr, engine) = serve().await;
    let mut ws = connect(addr, "a").await;
    expect_snapshot_request(&mut ws).await;

    ws.close(None).await.unwrap();
    eventually(|| !engine.endpoint("a").unwrap().is_available()).await;
    assert_eq!(engine.endpoint_count(), 1);
    assert_eq!(engine.pause_all(), 0);
}

#[tokio::test]
async fn test_reconnect_supersedes_old_connection() {
    let (addr, engine) = serve().await;
    let mut first = connect(addr, "a").await;
    expect_snapshot_request(&mut first).await;

    let mut second = connect(addr, "a").await;
    expect_snapshot_request(&mut second).await;

    // The old connection's late detach must not strip the new one
    assert!(closed(&mut first).await);
    assert!(engine.endpoint("a").unwrap().is_available());

    assert_eq!(engine.pause_all(), 1);
    assert_eq!(
        next_json(&mut second).await,
        json!({"event": "command", "func": "pauseVideo", "args": []})
    );
}
