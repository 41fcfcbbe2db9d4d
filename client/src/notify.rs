//! User-facing notifications.

use crate::websocket::{ConnectionManager, ServerMessage};

pub const LOCAL_ADD_NOTICE: &str = "Quote added locally. Will sync with server soon.";
pub const IMPORT_OK_NOTICE: &str = "Quotes imported and saved locally.";
pub const IMPORT_FAILED_NOTICE: &str = "Import failed: invalid JSON.";

/// Fire-and-forget notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Logs every notice and fans it out to WebSocket subscribers.
impl Notifier for ConnectionManager {
    fn notify(&self, message: &str) {
        tracing::info!(notice = %message, "Notify");
        self.broadcast(ServerMessage::notice(message));
    }
}
