//! HTTP API for the sync server
//!
//! - `POST /api/sessions` - Create a new viewing session
//! - `GET /api/sessions/:id` - Peek at the current session document
//! - `POST /api/sessions/:id/sync` - One poll: reconcile a viewer report
//! - `GET /health` - Health check

pub mod sessions;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use watchsync_core::store::SessionStore;

use crate::config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session store
    pub store: Arc<dyn SessionStore>,
    /// Service configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(store: Arc<dyn SessionStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/:id", get(sessions::get_session))
        .route("/api/sessions/:id/sync", post(sessions::sync_session))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}
