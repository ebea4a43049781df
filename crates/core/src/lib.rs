//! WatchSync Core
//!
//! Shared building blocks for the WatchSync synchronized-playback system:
//! - `model`: the server-authoritative session document and viewer records
//! - `protocol`: the poll request/response wire types
//! - `store`: the keyed session-store interface with exclusive update scopes
//! - `error`: common error types
//!
//! The client controller lives in `watchsync-client`; the reconciliation
//! service lives in `watchsync-server`. Both depend only on this crate for
//! the types they exchange.

pub mod error;
pub mod model;
pub mod protocol;
pub mod store;

pub use error::{Error, Result};
pub use model::{SessionDocument, ViewerRecord, ViewerReport};
pub use protocol::{Command, ErrorResponse, PollRequest};
pub use store::{MemoryStore, SessionGuard, SessionStore};
