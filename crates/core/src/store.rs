//! Session store interface
//!
//! The shared, exclusively-locked session document is the sole coordination
//! channel between viewers. A store hands out [`SessionGuard`]s: exclusive
//! scopes over a single session document that must be held across one entire
//! load→merge→evaluate→persist reconciliation to prevent lost updates when
//! two viewers poll concurrently. Dropping a guard without calling `save`
//! releases the scope without mutating the stored document.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::{Error, Result};
use crate::model::SessionDocument;

/// Durable keyed storage for session documents
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session document. Fails with [`Error::SessionExists`] if
    /// the id is already taken.
    async fn create(&self, session_id: &str, document: SessionDocument) -> Result<()>;

    /// Read the current document without locking
    async fn load(&self, session_id: &str) -> Result<Option<SessionDocument>>;

    /// Acquire the exclusive update scope for one reconciliation
    async fn lock_for_update(&self, session_id: &str) -> Result<Box<dyn SessionGuard>>;
}

/// Exclusive scope over a single session document
#[async_trait]
pub trait SessionGuard: Send {
    /// The document under exclusive access
    fn document(&mut self) -> &mut SessionDocument;

    /// Persist the document and release the scope
    async fn save(self: Box<Self>) -> Result<()>;
}

/// In-memory session store
///
/// One `tokio::sync::Mutex` per session provides the exclusive scope;
/// reconciliations for different sessions are fully independent. Suitable for
/// tests and single-process deployments; the service's file-backed store adds
/// durability on top of the same interface.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionDocument>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session_id: &str, document: SessionDocument) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(Error::SessionExists(session_id.to_string()));
        }
        sessions.insert(session_id.to_string(), Arc::new(Mutex::new(document)));
        tracing::debug!(session_id, "Created in-memory session");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionDocument>> {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned()
        };
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn lock_for_update(&self, session_id: &str) -> Result<Box<dyn SessionGuard>> {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?
        };
        let guard = slot.lock_owned().await;
        Ok(Box::new(MemoryGuard { guard }))
    }
}

/// Guard over an in-memory session slot
///
/// Mutations go straight into the shared slot, so `save` only releases the
/// lock.
struct MemoryGuard {
    guard: OwnedMutexGuard<SessionDocument>,
}

#[async_trait]
impl SessionGuard for MemoryGuard {
    fn document(&mut self) -> &mut SessionDocument {
        &mut self.guard
    }

    async fn save(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
