//! Endpoint WebSocket transport
//!
//! A player connects to `/ws/endpoints/:id`. Text frames it sends are status
//! snapshots; commands are pushed back as text frames. Connecting attaches
//! the endpoint's channel (registering unknown ids ungrouped); disconnecting
//! detaches it and leaves the registry record inert.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use playsync_core::{Endpoint, EndpointChannel};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::AppState;

/// GET /ws/endpoints/:id
pub async fn endpoint_socket(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, id))
}

async fn handle_socket(socket: WebSocket, state: AppState, endpoint_id: String) {
    let channel = state.hub.channel_for(&endpoint_id);

    if state.engine.endpoint(&endpoint_id).is_none() {
        let endpoint = Endpoint::new(endpoint_id.clone(), channel.clone());
        if let Err(e) = state.engine.add_endpoint(endpoint) {
            if !e.is_conflict() {
                warn!(endpoint_id = %endpoint_id, error = %e, "Rejecting endpoint connection");
                return;
            }
        }
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.config.channel.command_buffer);
    let generation = channel.attach(outbound_tx);
    info!(endpoint_id = %endpoint_id, generation, "Endpoint connected");

    channel.request_snapshot();

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                // None: replaced by a newer connection, or the endpoint was removed
                let Some(message) = outbound else { break };
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(endpoint_id = %endpoint_id, error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    debug!(endpoint_id = %endpoint_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        state.engine.ingest_raw(&endpoint_id, &text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws_tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(endpoint_id = %endpoint_id, error = %e, "WebSocket receive failed");
                        break;
                    }
                }
            }
        }
    }

    if channel.detach(generation) {
        info!(endpoint_id = %endpoint_id, "Endpoint disconnected");
    } else {
        debug!(endpoint_id = %endpoint_id, generation, "Connection closed after its channel was taken over");
    }
}
