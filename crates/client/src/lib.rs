//! WatchSync Client
//!
//! Viewer-side synchronization controller. Does not touch media itself: it
//! polls the sync server, reconciles the authoritative session document into
//! playback instructions, and emits them as [`PlaybackEvent`]s for a playback
//! engine to act on. The engine reports back through the controller's
//! readiness and command entry points (`ready`, `busy`, `play`, `pause`,
//! `seek`).
//!
//! ```no_run
//! use watchsync_client::{HttpSyncTransport, SyncClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpSyncTransport::new("http://localhost:8080", "sess_abc123")?;
//! let client = SyncClient::new(transport);
//! let mut events = client.subscribe();
//! client.start().await;
//!
//! while let Ok(event) = events.recv().await {
//!     // drive the playback engine
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod events;
pub mod transport;

pub use controller::SyncClient;
pub use events::PlaybackEvent;
pub use transport::{HttpSyncTransport, SyncTransport, TransportError};
