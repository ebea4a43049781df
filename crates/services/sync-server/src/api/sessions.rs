//! Session endpoints
//!
//! Session creation assigns an id and writes the zeroed default document;
//! the sync endpoint runs one reconciliation under the session's exclusive
//! update scope and returns the full authoritative document.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use watchsync_core::error::Error;
use watchsync_core::model::{unix_now, SessionDocument};
use watchsync_core::protocol::{ErrorResponse, PollRequest};

use super::AppState;
use crate::reconcile::reconcile;

/// Map store errors to HTTP status codes and structured responses
fn map_store_error(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
        Error::SessionExists(_) => StatusCode::CONFLICT,
        Error::InvalidSessionId(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Store failure: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Request body for POST /api/sessions
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// URL of the video to watch together
    pub video_url: Option<String>,
}

/// Response body for POST /api/sessions
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    /// Unique session id
    pub session_id: String,
}

/// POST /api/sessions - Create a new viewing session
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, Json<ErrorResponse>)> {
    let session_id = format!(
        "sess_{}",
        &uuid::Uuid::new_v4().simple().to_string()[..12]
    );

    let document = SessionDocument::new(request.video_url);
    state
        .store
        .create(&session_id, document)
        .await
        .map_err(map_store_error)?;

    tracing::info!(%session_id, "Created viewing session");

    Ok(Json(CreateSessionResponse { session_id }))
}

/// GET /api/sessions/:id - Read-only peek at the current document
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDocument>, (StatusCode, Json<ErrorResponse>)> {
    let document = state
        .store
        .load(&session_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| map_store_error(Error::SessionNotFound(session_id.clone())))?;

    Ok(Json(document))
}

/// POST /api/sessions/:id/sync - One reconciliation
///
/// The exclusive scope is held across load, reconcile and save; a lock or
/// store failure is fatal to this request and is not retried here (the
/// viewer's next scheduled poll is the retry).
pub async fn sync_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<PollRequest>,
) -> Result<Json<SessionDocument>, (StatusCode, Json<ErrorResponse>)> {
    let mut guard = state
        .store
        .lock_for_update(&session_id)
        .await
        .map_err(map_store_error)?;

    let reconcile_config = state.config.sync.reconcile_config();
    reconcile(
        guard.document(),
        &request.viewer_id,
        request.report,
        request.command,
        unix_now(),
        &reconcile_config,
    );

    let document = guard.document().clone();
    guard.save().await.map_err(map_store_error)?;

    tracing::debug!(
        %session_id,
        viewer_id = %request.viewer_id,
        viewers = document.viewers.len(),
        playing = document.video_playing,
        pending = document.video_play_on_all_ready,
        "Reconciled poll"
    );

    Ok(Json(document))
}
