//! WatchSync Reconciliation Service
//!
//! HTTP service coordinating synchronized video playback across viewers who
//! share no direct connection. Each viewer periodically POSTs its readiness
//! report (plus any playback command) to `/api/sessions/:id/sync`; the
//! service merges the report into the session document under an exclusive
//! per-session scope, prunes unreachable viewers, applies the command,
//! evaluates the start-together barrier, and returns the new authoritative
//! document.
//!
//! # Architecture
//!
//! ```text
//! viewer poll ──▶ axum handler ──▶ SessionStore::lock_for_update
//!                                      │ (exclusive per-session scope)
//!                                      ▼
//!                                  reconcile()   pure, unit-testable
//!                                      │
//!                                      ▼
//!                                  guard.save() ──▶ response: full document
//! ```

pub mod api;
pub mod config;
pub mod reconcile;
pub mod store;

pub use config::Config;
pub use reconcile::{reconcile, ReconcileConfig};
pub use store::FileStore;
