//! Cookie jar shared by every request and kept across runs.
//!
//! The jar is written to `<base>/cookies.json` (0600) after each response and
//! loaded again by the next command. Session cookies (no `Expires`) are kept
//! as well; an unreadable file is an empty jar.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow};
use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;

use super::store::write_private;
use crate::config::paths;

/// Cookie store handed to the HTTP client, optionally backed by a file.
#[derive(Clone)]
pub struct CookieJar {
    store: Arc<CookieStoreMutex>,
    path: Option<PathBuf>,
}

impl CookieJar {
    /// Jar that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(CookieStoreMutex::new(CookieStore::default())),
            path: None,
        }
    }

    /// Loads the jar from `path`.
    ///
    /// Never fails: a missing or unreadable file is an empty jar.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = match read_store(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "Cookie jar is unreadable; starting empty"
                );
                CookieStore::default()
            }
        };

        Self {
            store: Arc::new(CookieStoreMutex::new(store)),
            path: Some(path),
        }
    }

    /// Jar at the default `${TIMEGEN_HOME}/cookies.json`.
    pub fn at_default_path() -> Self {
        Self::load(paths::cookies_path())
    }

    /// Provider for `reqwest::ClientBuilder::cookie_provider`.
    pub fn provider(&self) -> Arc<CookieStoreMutex> {
        Arc::clone(&self.store)
    }

    fn lock(&self) -> MutexGuard<'_, CookieStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes the jar to its file; a no-op for in-memory jars.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut contents = Vec::new();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&self.lock(), &mut contents)
            .map_err(|e| anyhow!("{e}"))
            .context("Failed to serialize cookies")?;
        write_private(path, &contents)
    }

    /// Drops every cookie and persists the empty jar.
    pub fn clear(&self) -> Result<()> {
        self.lock().clear();
        self.save()
    }

    /// Whether a live cookie called `name` is held.
    #[cfg(test)]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.lock().iter_unexpired().any(|cookie| cookie.name() == name)
    }
}

fn read_store(path: &Path) -> Result<CookieStore> {
    if !path.exists() {
        return Ok(CookieStore::default());
    }
    if fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len()
        == 0
    {
        return Ok(CookieStore::default());
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    cookie_store::serde::json::load(BufReader::new(file))
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("Failed to parse cookies from {}", path.display()))
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("path", &self.path)
            .field("cookies", &self.lock().iter_unexpired().count())
            .finish()
    }
}
