//! Sync endpoint routes.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::Result;
use crate::handlers::handle_notification_socket;
use crate::sync::{SyncOutcome, SyncStatus};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_handler))
        .route("/sync/status", get(status_handler))
        .route("/notifications", get(notifications_handler))
}

/// Outcome of an on-demand sync.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    pub message: String,
}

/// POST /sync - Run a cycle now and wait for it.
async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    let outcome = state.sync.sync_now().await?;
    Ok(Json(SyncResponse {
        message: outcome.message(),
        outcome,
    }))
}

/// GET /sync/status - Current phase and last outcome.
async fn status_handler(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.sync.status())
}

/// GET /notifications - Subscribe to notices over WebSocket.
async fn notifications_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_notification_socket(socket, state.conn_manager))
}
