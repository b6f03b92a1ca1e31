//! WebSocket endpoint for live change envelopes.
//!
//! Each connection registers a queue-backed observer with the broadcaster.
//! A writer task drains the queue into the socket while the read loop
//! serves inbound `update_value` requests. The connection unregisters its
//! observer when either side ends, or when the client falls so far behind
//! that its queue overflows.

use crate::application::broadcaster::ObserverChannel;
use crate::application::error::ControlError;
use crate::infrastructure::ws_channel::queued_observer;
use crate::presentation::app_state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum InboundMessage {
    UpdateValue { id: String, value: f64 },
}

/// `GET /api/ws`
pub async fn ws_observer(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (observer, mut outbound) = queued_observer(state.observer_queue);
    let observer = Arc::new(observer);
    let broadcaster = state.service.broadcaster().clone();
    let observer_id = broadcaster.register(observer.clone()).await;

    let (mut sink, stream) = socket.split();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => debug!(observer = %observer_id, "WebSocket writer closed"),
        _ = read_loop(stream, &state, observer.as_ref()) => debug!(observer = %observer_id, "WebSocket client disconnected"),
        _ = observer.overflowed() => warn!(observer = %observer_id, "Observer queue overflowed, closing connection"),
    }

    broadcaster.unregister(observer_id).await;
    writer.abort();
}

async fn read_loop(mut stream: SplitStream<WebSocket>, state: &AppState, replies: &dyn ObserverChannel) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_inbound(state, &text).await {
                    let reply = serde_json::json!({ "error": e.to_string() }).to_string();
                    if replies.send(&reply).await.is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Close(_)) => return,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error: {e}");
                return;
            }
        }
    }
}

/// Apply one inbound request. Success is reported by the resulting broadcast.
async fn handle_inbound(state: &AppState, text: &str) -> Result<(), ControlError> {
    let message: InboundMessage = serde_json::from_str(text).map_err(|e| {
        warn!("Rejected WebSocket message: {}", e);
        ControlError::validation(format!("unsupported message: {e}"))
    })?;

    match message {
        InboundMessage::UpdateValue { id, value } => {
            state.service.set_value(&id, value).await?;
        }
    }
    Ok(())
}
