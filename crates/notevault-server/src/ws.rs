//! WebSocket connection lifecycle.
//!
//! Each accepted socket gets a process-local id and an unbounded outbound
//! channel. A spawned writer task drains that channel into the socket, so
//! the presence hub's broadcasts never wait on a slow client. The read
//! loop feeds inbound frames to the coordinator and runs the disconnect
//! path exactly once when the stream ends, however it ends.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use notevault_core::ServerMessage;
use tokio::sync::mpsc;
use tracing::debug;

use crate::AppState;

/// `GET /ws` — upgrade to the real-time protocol.
pub async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let conn = state.coordinator.hub().allocate_id();
    debug!(conn, "connection opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Writer task: the consuming end of this connection's outbound queue.
    // Exits when every sender is gone (the hub drops its clone on leave).
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink
                .send(Message::Text(message.to_text().into()))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                state.coordinator.handle_message(conn, &tx, text.as_str());
            }
            Ok(Message::Close(_)) => break,
            // Binary frames are not part of the protocol; ping/pong is
            // handled by the transport.
            Ok(_) => continue,
            Err(e) => {
                debug!(conn, "websocket error: {}", e);
                break;
            }
        }
    }

    debug!(conn, "connection closed");
    state.coordinator.handle_disconnect(conn);
    drop(tx);
    let _ = writer.await;
}
