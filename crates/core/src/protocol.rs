//! Poll wire protocol
//!
//! One poll is one `PollRequest` up and either a full
//! [`SessionDocument`](crate::model::SessionDocument) or an [`ErrorResponse`]
//! back. There is no other traffic between viewers and the server.

use serde::{Deserialize, Serialize};

use crate::model::ViewerReport;

/// Playback command carried by a poll
///
/// `Seek` requests playback (pending the all-ready barrier) at the given
/// position; `Pause` pauses at the given position. Plain polls carry `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    #[default]
    None,
    Pause {
        /// Playhead position in seconds
        time: f64,
    },
    Seek {
        /// Playhead position in seconds
        time: f64,
    },
}

impl Command {
    /// A plain poll with no playback command attached
    pub fn is_none(&self) -> bool {
        matches!(self, Command::None)
    }
}

/// Request body for one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollRequest {
    /// Randomly generated viewer id (uniqueness best-effort)
    pub viewer_id: String,

    /// The viewer's current readiness/timing state
    pub report: ViewerReport,

    /// Playback command, if any
    #[serde(default)]
    pub command: Command,
}

/// Error body returned with a non-2xx status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}
