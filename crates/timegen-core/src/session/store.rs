//! Session persistence.
//!
//! The file store keeps three independent string entries in
//! `<base>/session.json` with restricted permissions (0600). An entry is
//! removed when its value becomes absent. Tokens are never logged in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use timegen_types::UserIdentity;

use super::Session;
use crate::config::paths;

/// Storage backend for the session record.
///
/// Reads are synchronous so the session can be restored before any command runs.
pub trait SessionStore: Send + Sync {
    /// Reads the persisted session. A missing record is an empty session.
    fn load(&self) -> Result<Session>;

    /// Overwrites the persisted session; absent fields are removed.
    fn save(&self, session: &Session) -> Result<()>;
}

/// On-disk layout: one optional string per entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntries {
    #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// Identity serialized to a JSON string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

impl StoredEntries {
    fn from_session(session: &Session) -> Result<Self> {
        let user = session
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize user identity")?;
        Ok(Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            user,
        })
    }

    fn into_session(self) -> Session {
        let user = non_empty(self.user).and_then(|raw| {
            match serde_json::from_str::<UserIdentity>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed stored user identity");
                    None
                }
            }
        });
        Session {
            user,
            access_token: non_empty(self.access_token),
            refresh_token: non_empty(self.refresh_token),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Session persisted to a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default `${TIMEGEN_HOME}/session.json`.
    pub fn at_default_path() -> Self {
        Self::new(paths::session_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Session> {
        if !self.path.exists() {
            return Ok(Session::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session from {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Session::default());
        }

        match serde_json::from_str::<StoredEntries>(&contents) {
            Ok(entries) => Ok(entries.into_session()),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Session file is malformed; starting unauthenticated"
                );
                Ok(Session::default())
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let entries = StoredEntries::from_session(session)?;
        let contents =
            serde_json::to_string_pretty(&entries).context("Failed to serialize session")?;
        write_private(&self.path, contents.as_bytes())
    }
}

/// Writes `contents` to `path`, readable only by the owner on unix.
pub(super) fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    Ok(())
}

/// Session kept in memory; used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// Last saved session.
    pub fn snapshot(&self) -> Session {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Session> {
        Ok(self.snapshot())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session.clone();
        Ok(())
    }
}

/// Returns a masked version of a token for display (first 8 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 12 || !token.is_char_boundary(8) {
        return "***".to_string();
    }
    format!("{}...", &token[..8])
}
