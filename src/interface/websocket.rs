//! WebSocket subscriber transport
//!
//! Each connection becomes one broadcaster subscriber. Outbound messages are
//! queued on a bounded channel and written by a dedicated task; inbound text
//! frames are parsed as control messages.

use crate::infrastructure::broadcast::{ChannelSink, ControlMessage, EventBroadcaster};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct WsState {
    pub broadcaster: Arc<EventBroadcaster>,
    /// Outbound queue depth per connection
    pub queue_capacity: usize,
}

/// Build the router serving `/ws`
pub fn router(state: WsState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let (sink, mut rx) = ChannelSink::channel(state.queue_capacity);
    let broadcaster = state.broadcaster;
    let subscriber_id = broadcaster.connect(Arc::new(sink));

    info!(subscriber_id = %subscriber_id, "WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                debug!("Client disconnected");
                break;
            }
        }
    });

    let control = broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => {
                    info!(subscriber_id = %subscriber_id, "WebSocket client requested close");
                    break;
                }
                Message::Pong(_) => {
                    if let Err(e) = control.record_pong(subscriber_id) {
                        warn!(subscriber_id = %subscriber_id, error = %e, "Pong rejected");
                    }
                }
                Message::Text(text) => match ControlMessage::parse(&text) {
                    Ok(message) => {
                        if let Err(e) = control.handle_control(subscriber_id, message) {
                            warn!(subscriber_id = %subscriber_id, error = %e, "Control message rejected");
                        }
                    }
                    Err(e) => {
                        warn!(subscriber_id = %subscriber_id, error = %e, "Malformed control message");
                    }
                },
                // Pings are answered by axum
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    broadcaster.disconnect(subscriber_id);
    info!(subscriber_id = %subscriber_id, "WebSocket client disconnected");
}
