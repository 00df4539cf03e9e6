//! # Credential Persistence
//!
//! The non-volatile key-value store for auth state.
//!
//! ## What Persists (and What Doesn't)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Persisted Session State                            │
//! │                                                                         │
//! │  PERSISTED (session.toml)              NEVER PERSISTED                 │
//! │  ────────────────────────              ───────────────                 │
//! │  • access credential                   • cache entries                 │
//! │  • refresh credential                  • subscriptions                 │
//! │  • expiry + session id                 • in-flight state               │
//! │  • last-known user record                                              │
//! │                                                                         │
//! │  A restart reads this file and optimistically restores the signed-in   │
//! │  shell while a background current-user call confirms or revokes it.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use atrium_core::{AuthSession, UserRecord};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Persisted Session
// =============================================================================

/// Everything needed to restore a session across a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// The credential set.
    pub session: AuthSession,

    /// The user as last reported by the backend.
    pub user: UserRecord,

    /// When this snapshot was written.
    pub saved_at: DateTime<Utc>,
}

// =============================================================================
// Credential Store Trait
// =============================================================================

/// Non-volatile storage for the auth session.
///
/// Implementations must be atomic per operation: a reader never observes a
/// half-written session.
pub trait CredentialStore: Send + Sync {
    /// Reads the stored session, if any.
    fn load(&self) -> StoreResult<Option<PersistedSession>>;

    /// Replaces the stored session.
    fn save(&self, session: &PersistedSession) -> StoreResult<()>;

    /// Removes the stored session. A missing store is not an error.
    fn clear(&self) -> StoreResult<()>;
}

// =============================================================================
// File-Backed Store
// =============================================================================

/// TOML file under the platform config directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store at an explicit path.
    pub fn new(path: PathBuf) -> Self {
        FileCredentialStore { path }
    }

    /// Creates a store at the platform default location.
    pub fn at_default_path() -> Option<Self> {
        directories::ProjectDirs::from("dev", "atrium", "atrium")
            .map(|dirs| FileCredentialStore::new(dirs.config_dir().join("session.toml")))
    }

    /// The file location.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> StoreResult<Option<PersistedSession>> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No stored session");
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| StoreError::CredentialLoadFailed(e.to_string()))?;
        match toml::from_str(&contents) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupt file means the session is gone, not that the
                // process can't start.
                warn!(path = ?self.path, error = %e, "Stored session unreadable, discarding");
                let _ = std::fs::remove_file(&self.path);
                Ok(None)
            }
        }
    }

    fn save(&self, session: &PersistedSession) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::CredentialSaveFailed(e.to_string()))?;
        }
        let contents = toml::to_string_pretty(session)?;
        // Write-then-rename so a crash never leaves a torn file behind.
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents)
            .map_err(|e| StoreError::CredentialSaveFailed(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
        }
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::CredentialSaveFailed(e.to_string()))?;
        info!(path = ?self.path, "Session persisted");
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = ?self.path, "Stored session removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::CredentialSaveFailed(e.to_string())),
        }
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Volatile store for tests and for deployments that opt out of persistence.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<PersistedSession>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> StoreResult<Option<PersistedSession>> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn save(&self, session: &PersistedSession) -> StoreResult<()> {
        *self.slot.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }
}
