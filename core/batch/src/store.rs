//! Client-side session persistence.
//!
//! The token pair and cached identity survive process restarts the way the
//! browser original kept them in localStorage: written after a successful
//! exchange or refresh, read at startup, cleared as a unit on logout.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

use boxlift_common::{Error, Result};
use boxlift_provider::{Identity, TokenPair};

/// Persisted session: the current pair plus the identity resolved at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub tokens: TokenPair,
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// Session persistence seam.
pub trait SessionStore: Send + Sync {
    /// Read the stored session, if any.
    fn load(&self) -> Result<Option<StoredSession>>;

    /// Replace the stored session wholesale.
    fn save(&self, session: &StoredSession) -> Result<()>;

    /// Remove the stored session as a unit.
    fn clear(&self) -> Result<()>;
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<StoredSession>> {
        (**self).load()
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        (**self).save(session)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// JSON-file session store under the user's config directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location, `<config dir>/boxlift/session.json`.
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::InvalidInput("no config directory available".to_string()))?;
        Ok(Self::new(base.join("boxlift").join("session.json")))
    }

    /// Path the session is stored at.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let session = serde_json::from_str(&contents)
            .map_err(|e| Error::Serialization(format!("corrupt session file: {}", e)))?;
        Ok(Some(session))
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-memory session store for tests and development.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a session already present.
    pub fn with_session(session: StoredSession) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        Ok(self.inner.lock().unwrap().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        *self.inner.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap() = None;
        Ok(())
    }
}
