//! WebSocket support for live notifications.
//!
//! Subscribers connect to `/notifications` and receive every notice the
//! client raises (sync outcomes, local adds, imports) as it happens.

mod manager;
mod protocol;

pub use manager::ConnectionManager;
pub use protocol::*;
