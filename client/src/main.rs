//! Quotesync Client - local-first quote collection with background sync.
//!
//! Serves the control API and runs the sync worker against the configured
//! remote mirror until interrupted.

use std::sync::Arc;

use quotesync_client::config::Config;
use quotesync_client::remote::HttpRemote;
use quotesync_client::storage::FileStorage;
use quotesync_client::sync::SyncOrchestrator;
use quotesync_client::websocket::ConnectionManager;
use quotesync_client::{app, shared_store, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quotesync_client=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting Quotesync client on {}:{}", config.host, config.port);

    // Open local storage
    let storage = FileStorage::open(&config.data_dir)?;
    let store = shared_store(storage);
    let records = store.lock().await.len();
    tracing::info!(
        data_dir = %config.data_dir.display(),
        records,
        "Loaded local collection"
    );

    // Start the sync worker
    let remote = Arc::new(HttpRemote::new(&config.remote)?);
    tracing::info!(remote = %remote.url(), "Remote mirror configured");

    let conn_manager = ConnectionManager::new_shared();
    let (orchestrator, sync) = SyncOrchestrator::new(
        store.clone(),
        remote,
        conn_manager.clone(),
        config.sync.clone(),
    );
    orchestrator.spawn();

    let state = AppState {
        store,
        sync,
        conn_manager,
    };

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Control API listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
