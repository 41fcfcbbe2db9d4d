//! WebSocket handler for live notifications.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::websocket::{ClientMessage, ConnectionManager, ServerMessage};

/// Handle an established notification socket.
///
/// This function:
/// 1. Registers the connection with the manager
/// 2. Spawns a task to forward outgoing messages
/// 3. Answers pings until the client goes away
/// 4. Cleans up on disconnect
pub async fn handle_notification_socket(socket: WebSocket, conn_manager: Arc<ConnectionManager>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_id = conn_manager.register(tx);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                conn_manager.send_to(&conn_id, process_message(text.as_str()));
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        active_connections = conn_manager.connection_count(),
        "Notification subscriber disconnected"
    );
}

/// Answer a subscriber message.
fn process_message(text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Err(e) => ServerMessage::error(format!("Invalid message format: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_gets_pong() {
        assert_eq!(process_message(r#"{"type": "ping"}"#), ServerMessage::Pong);
    }

    #[test]
    fn garbage_gets_error() {
        assert!(matches!(
            process_message("not json"),
            ServerMessage::Error { .. }
        ));
    }
}
