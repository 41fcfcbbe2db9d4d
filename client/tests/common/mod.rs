//! Shared fixtures: an in-process fake of the remote posts service and a
//! notifier that records what it is told.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use quotesync_client::config::{RemoteConfig, SyncConfig};
use quotesync_client::notify::Notifier;
use quotesync_client::remote::HttpRemote;
use quotesync_client::sync::{SyncHandle, SyncOrchestrator};
use quotesync_client::{shared_store, SharedStore};
use quotesync_engine::{MemoryStorage, RetryPolicy, Storage};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Id the fake assigns to every created post, like the public posts service.
pub const CREATED_ID: u64 = 101;

/// Knobs and counters of the fake remote mirror.
#[derive(Debug, Default)]
pub struct MirrorState {
    pub posts: Mutex<Vec<Value>>,
    pub created: Mutex<Vec<Value>>,
    pub fail_fetch: AtomicBool,
    pub fail_push: AtomicBool,
    pub fetch_delay_ms: AtomicU64,
    pub push_delay_ms: AtomicU64,
    pub fetches: AtomicUsize,
    pub pushes: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MirrorState {
    pub fn set_posts(&self, posts: Vec<Value>) {
        *self.posts.lock().unwrap() = posts;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A running fake mirror.
pub struct Mirror {
    pub base: String,
    pub state: Arc<MirrorState>,
}

impl Mirror {
    pub fn posts_url(&self) -> String {
        format!("{}/posts", self.base)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            url: self.posts_url(),
            request_timeout: Duration::from_secs(2),
            ..RemoteConfig::default()
        }
    }

    pub fn http_remote(&self) -> HttpRemote {
        HttpRemote::new(&self.remote_config()).unwrap()
    }
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

async fn list_posts(
    State(mirror): State<Arc<MirrorState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mirror.fetches.fetch_add(1, Ordering::SeqCst);
    mirror.enter();
    pause(mirror.fetch_delay_ms.load(Ordering::SeqCst)).await;
    mirror.leave();

    if mirror.fail_fetch.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let limit = params
        .get("_limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(usize::MAX);
    let posts: Vec<Value> = mirror
        .posts
        .lock()
        .unwrap()
        .iter()
        .take(limit)
        .cloned()
        .collect();
    Json(posts).into_response()
}

async fn create_post(State(mirror): State<Arc<MirrorState>>, Json(body): Json<Value>) -> Response {
    mirror.pushes.fetch_add(1, Ordering::SeqCst);
    pause(mirror.push_delay_ms.load(Ordering::SeqCst)).await;

    if mirror.fail_push.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    mirror.created.lock().unwrap().push(body.clone());
    let mut created = body;
    created["id"] = json!(CREATED_ID);
    (StatusCode::CREATED, Json(created)).into_response()
}

/// Start a fake mirror on an ephemeral port.
pub async fn spawn_mirror() -> Mirror {
    let state = Arc::new(MirrorState::default());
    let app = Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/broken", get(|| async { "definitely not json" }))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Mirror {
        base: format!("http://{}", addr),
        state,
    }
}

/// Post in the shape the remote listing returns.
pub fn post(id: u64, title: &str, body: &str) -> Value {
    json!({"userId": 1, "id": id, "title": title, "body": body})
}

/// Notifier keeping every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.messages.lock().unwrap().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Sync settings whose timer never fires during a test.
pub fn manual_sync_config(retry: RetryPolicy) -> SyncConfig {
    SyncConfig {
        fetch_limit: 10,
        interval: Duration::from_secs(3600),
        initial_delay: Duration::from_secs(3600),
        retry,
    }
}

/// A running orchestrator wired to a fake mirror.
pub struct Harness {
    pub mirror: Mirror,
    pub store: SharedStore,
    pub sync: SyncHandle,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub async fn start(config: SyncConfig) -> Self {
        Self::start_with_storage(config, MemoryStorage::new()).await
    }

    pub async fn start_with_storage(config: SyncConfig, storage: impl Storage + 'static) -> Self {
        let mirror = spawn_mirror().await;
        let store = shared_store(storage);
        let notifier = Arc::new(RecordingNotifier::default());

        let (orchestrator, sync) = SyncOrchestrator::new(
            store.clone(),
            Arc::new(mirror.http_remote()),
            notifier.clone(),
            config,
        );
        orchestrator.spawn();

        Self {
            mirror,
            store,
            sync,
            notifier,
        }
    }
}
