//! Live notification channel over WebSocket.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use crate::services::delivery::ClientHandle;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Forward queued notifications to the client until either side hangs up.
/// Inbound frames are only read to detect close; the channel is
/// server-push-only.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle_id = Uuid::new_v4();

    state
        .live_channels
        .register(user_id, ClientHandle::new(handle_id, tx));

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(payload) = outbound else { break };
                if let Err(e) = sender.send(Message::Text(payload.into())).await {
                    tracing::warn!(user_id = %user_id, "websocket send failed: {}", e);
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(user_id = %user_id, "websocket closed");
                        break;
                    }
                    Some(Ok(_)) => {} // Client pings and acks are ignored.
                    Some(Err(e)) => {
                        tracing::warn!(user_id = %user_id, "websocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    state.live_channels.deregister(user_id, handle_id);
}
