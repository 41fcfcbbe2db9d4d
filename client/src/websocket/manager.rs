//! WebSocket connection manager.
//!
//! Tracks notification subscribers and fans every notice out to all of them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection.
    ///
    /// Returns the connection ID.
    pub fn register(&self, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.connections.insert(
            conn_id.clone(),
            Connection {
                id: conn_id.clone(),
                sender,
            },
        );

        tracing::info!(conn_id = %conn_id, "WebSocket connection registered");

        conn_id
    }

    /// Unregister a connection.
    pub fn unregister(&self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            tracing::info!(conn_id = %conn_id, "WebSocket connection unregistered");
        }
    }

    /// Broadcast a message to all connections.
    ///
    /// Returns the number of connections that received the message.
    pub fn broadcast(&self, message: ServerMessage) -> usize {
        let mut sent_count = 0;

        for entry in self.connections.iter() {
            if entry.value().sender.send(message.clone()).is_ok() {
                sent_count += 1;
            }
        }

        tracing::debug!(recipients = sent_count, "Broadcast message to connections");

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(tx);
        assert_eq!(manager.connection_count(), 1);

        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);

        // Unknown ids are ignored
        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let manager = ConnectionManager::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.register(tx1);
        manager.register(tx2);

        let sent = manager.broadcast(ServerMessage::notice("hello"));
        assert_eq!(sent, 2);

        assert_eq!(rx1.try_recv().unwrap(), ServerMessage::notice("hello"));
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::notice("hello"));
    }

    #[test]
    fn test_broadcast_skips_closed_receivers() {
        let manager = ConnectionManager::new();

        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.register(tx1);
        manager.register(tx2);
        drop(rx1);

        assert_eq!(manager.broadcast(ServerMessage::Pong), 1);
        assert!(matches!(rx2.try_recv().unwrap(), ServerMessage::Pong));
    }

    #[test]
    fn test_send_to() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = manager.register(tx);

        assert!(manager.send_to(&conn_id, ServerMessage::Pong));
        assert!(!manager.send_to("missing", ServerMessage::Pong));
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Pong));
    }
}
