//! Progress socket: relays session events and keeps the connection alive

use crate::server::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use ripplica_core::ProgressEvent;
use serde_json::{json, Map, Value};
use std::time::Instant;

pub async fn status_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(ws_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| serve_session(socket, state, ws_id))
}

/// Flat wire shape: `{step, timestamp, ...payload}`
pub fn wire_message(event: &ProgressEvent) -> Value {
    let mut message: Map<String, Value> = event.payload.clone();
    message.insert("step".to_string(), json!(event.step));
    message.insert("timestamp".to_string(), json!(event.timestamp));
    Value::Object(message)
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    value: &Value,
) -> Result<(), axum::Error> {
    sink.send(Message::Text(value.to_string())).await
}

async fn serve_session(socket: WebSocket, state: AppState, ws_id: String) {
    let started = Instant::now();
    let mut events = state.hub.connect(&ws_id);
    let (mut sink, mut incoming) = socket.split();
    tracing::info!(
        "Progress socket connected for session {} ({} open)",
        ws_id,
        state.hub.session_count()
    );

    let connected = json!({ "step": "connected", "ws_id": &ws_id, "timestamp": Utc::now() });
    if send_json(&mut sink, &connected).await.is_ok() {
        let mut pings: u64 = 0;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = send_json(&mut sink, &wire_message(&event)).await {
                            tracing::warn!("Failed to relay '{}' to session {}: {}", event.step, ws_id, e);
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("Session {} taken over by a newer socket", ws_id);
                        break;
                    }
                },
                message = incoming.next() => match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Message from session {}: {}", ws_id, text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("Socket error on session {}: {}", ws_id, e);
                        break;
                    }
                },
                _ = tokio::time::sleep(state.keepalive) => {
                    pings += 1;
                    let ping = json!({ "step": "ping", "count": pings, "timestamp": Utc::now() });
                    if send_json(&mut sink, &ping).await.is_err() {
                        break;
                    }
                    tracing::debug!("Ping {} sent to session {}", pings, ws_id);
                }
            }
        }
    }

    state.hub.disconnect(&events);
    tracing::info!(
        "Progress socket for session {} closed after {:.2}s",
        ws_id,
        started.elapsed().as_secs_f64()
    );
}
