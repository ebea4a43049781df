//! Poll transport
//!
//! The controller talks to the server through [`SyncTransport`]; the
//! production implementation is plain HTTP+JSON against the sync endpoint.
//! The error type separates delivery failures (retried implicitly by the
//! next scheduled poll) from session-level failures the server signalled
//! explicitly (fatal to the controller).

use async_trait::async_trait;
use thiserror::Error;

use watchsync_core::model::SessionDocument;
use watchsync_core::protocol::{ErrorResponse, PollRequest};

/// Transport-level errors for one poll
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never completed (connection refused, timeout, ...)
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// The response body could not be parsed
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The server explicitly signalled failure (e.g. unknown session)
    #[error("Session error: {0}")]
    Session(String),
}

/// One poll: viewer report and command up, authoritative document back
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    async fn poll(&self, request: &PollRequest) -> Result<SessionDocument, TransportError>;
}

/// HTTP transport against a WatchSync server's sync endpoint
pub struct HttpSyncTransport {
    /// Full URL of the session's sync endpoint
    sync_url: String,

    /// Reqwest HTTP client
    client: reqwest::Client,
}

impl HttpSyncTransport {
    /// Create a transport for one session
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server base URL (e.g. "http://localhost:8080")
    /// * `session_id` - Id of the session to synchronize against
    pub fn new(
        base_url: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(TransportError::Unreachable(format!(
                "base_url must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Unreachable(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            sync_url: format!(
                "{}/api/sessions/{}/sync",
                base_url.trim_end_matches('/'),
                session_id.into()
            ),
            client,
        })
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn poll(&self, request: &PollRequest) -> Result<SessionDocument, TransportError> {
        let response = self
            .client
            .post(&self.sync_url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // The server signals session-level failure as a structured error
            // body; fall back to the bare status line if it isn't one.
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error,
                Err(_) => format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            };
            return Err(TransportError::Session(message));
        }

        response
            .json::<SessionDocument>()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}
