//! Sync Server Binary
//!
//! Entry point for the WatchSync reconciliation service.

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchsync_core::store::{MemoryStore, SessionStore};
use watchsync_server::api::{build_router, AppState};
use watchsync_server::config::{Config, StorageBackend};
use watchsync_server::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WatchSync server...");

    // Load configuration (path from SYNC_CONFIG, falling back to env vars)
    let config_path = std::env::var("SYNC_CONFIG").ok();
    let config = Config::load(config_path.as_deref())?;
    let config = Arc::new(config);

    tracing::info!(
        "Configuration: port={}, storage={:?}, max_poll_interval={}s",
        config.server.http_port,
        config.storage.backend,
        config.sync.max_poll_interval
    );

    // Build the session store
    let store: Arc<dyn SessionStore> = match config.storage.backend {
        StorageBackend::File => Arc::new(FileStore::new(config.storage.data_dir.clone()).await?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };

    // Build HTTP router
    let state = AppState::new(store, config.clone());
    let router = build_router(state);

    // Start HTTP server with graceful shutdown on SIGTERM/SIGINT
    let bind_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, shutting down...");
        })
        .await?;

    tracing::info!("WatchSync server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
