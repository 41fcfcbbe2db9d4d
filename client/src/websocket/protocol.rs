//! WebSocket message protocol definitions.
//!
//! All messages are JSON-encoded and tagged by `type`.

use serde::{Deserialize, Serialize};

/// Messages a notification subscriber may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive ping.
    Ping,
}

/// Messages sent to notification subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A user-facing notification.
    Notice {
        /// Notification text
        message: String,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error {
        /// Error description
        message: String,
    },
}

impl ServerMessage {
    /// Create a notice.
    pub fn notice(message: impl Into<String>) -> Self {
        ServerMessage::Notice {
            message: message.into(),
        }
    }

    /// Create an error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
