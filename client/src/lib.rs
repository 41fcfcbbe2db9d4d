//! Quotesync Client - a local-first quote collection.
//!
//! The client keeps its quotes on disk, serves them through a small control
//! API and mirrors them against a remote posts service in the background
//! using the quotesync-engine reconciliation logic.

pub mod config;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod remote;
pub mod routes;
pub mod storage;
pub mod sync;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use quotesync_engine::{RecordStore, Storage};
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::sync::SyncHandle;
use crate::websocket::ConnectionManager;

/// The local collection, guarded by the one lock every writer takes.
pub type SharedStore = Arc<Mutex<RecordStore<Box<dyn Storage>>>>;

/// Open the store over `storage` and wrap it for sharing.
pub fn shared_store(storage: impl Storage + 'static) -> SharedStore {
    let storage: Box<dyn Storage> = Box::new(storage);
    Arc::new(Mutex::new(RecordStore::open(storage)))
}

/// Run a store operation on the blocking pool.
///
/// Mutations end in a synchronous storage write and the category filter is
/// read from storage, so neither runs on an async worker.
pub async fn with_store<T, F>(store: &SharedStore, f: F) -> Result<T, JoinError>
where
    F: FnOnce(&mut RecordStore<Box<dyn Storage>>) -> T + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&mut store.blocking_lock())).await
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sync: SyncHandle,
    pub conn_manager: Arc<ConnectionManager>,
}

/// Build the control API router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
