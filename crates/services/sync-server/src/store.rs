//! File-backed session store
//!
//! One JSON file per session under a data directory. The exclusive update
//! scope is a per-session async mutex held for the whole reconciliation;
//! persistence is write-to-temp-then-rename so readers never observe a
//! half-written document.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use watchsync_core::error::{Error, Result};
use watchsync_core::model::SessionDocument;
use watchsync_core::store::{SessionGuard, SessionStore};

/// Session ids become file names, so restrict them to a path-safe alphabet.
fn validate_session_id(session_id: &str) -> Result<()> {
    let ok = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidSessionId(session_id.to_string()))
    }
}

/// File-backed [`SessionStore`]
pub struct FileStore {
    data_dir: PathBuf,

    /// Per-session locks providing the exclusive update scope. Lock entries
    /// are created on demand and live for the process lifetime; one entry per
    /// session is cheap next to the session file itself.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    /// Create a store rooted at `data_dir`, creating the directory if needed
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        Ok(Self {
            data_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", session_id))
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_document(path: &Path) -> Result<Option<SessionDocument>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let document = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Store(format!("Corrupt session document: {}", e)))?;
                Ok(Some(document))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(path: &Path, document: &SessionDocument) -> Result<()> {
        let bytes = serde_json::to_vec(document)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn create(&self, session_id: &str, document: SessionDocument) -> Result<()> {
        validate_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let _held = lock.lock().await;

        let path = self.session_path(session_id);
        if tokio::fs::try_exists(&path).await? {
            return Err(Error::SessionExists(session_id.to_string()));
        }
        Self::write_document(&path, &document).await?;
        tracing::debug!(session_id, path = %path.display(), "Created session file");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionDocument>> {
        validate_session_id(session_id)?;
        Self::read_document(&self.session_path(session_id)).await
    }

    async fn lock_for_update(&self, session_id: &str) -> Result<Box<dyn SessionGuard>> {
        validate_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let held = lock.lock_owned().await;

        let path = self.session_path(session_id);
        let document = Self::read_document(&path)
            .await?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        Ok(Box::new(FileGuard {
            document,
            path,
            _held: held,
        }))
    }
}

/// Exclusive scope over one session file
struct FileGuard {
    document: SessionDocument,
    path: PathBuf,
    _held: OwnedMutexGuard<()>,
}

#[async_trait]
impl SessionGuard for FileGuard {
    fn document(&mut self) -> &mut SessionDocument {
        &mut self.document
    }

    async fn save(self: Box<Self>) -> Result<()> {
        FileStore::write_document(&self.path, &self.document).await
    }
}
