//! Session state and its single owner.
//!
//! A [`SessionHandle`] is the only path through which credentials are read or
//! written. Every mutation is persisted through the configured
//! [`SessionStore`] while the lock is held, so memory and storage never
//! disagree.

mod cookies;
mod store;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use timegen_types::{AuthTokens, UserIdentity};

pub use cookies::CookieJar;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, mask_token};

/// Identity plus the two credentials. Absence of any field means unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<UserIdentity>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some() && self.refresh_token.is_some()
    }
}

struct Shared {
    session: Mutex<Session>,
    store: Arc<dyn SessionStore>,
}

/// Cloneable handle to the process-wide session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Restores the session from `store`.
    ///
    /// Never fails: an unreadable store is logged and treated as unauthenticated.
    pub fn bootstrap(store: Arc<dyn SessionStore>) -> Self {
        let session = match store.load() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Could not restore session");
                Session::default()
            }
        };
        tracing::debug!(
            authenticated = session.is_authenticated(),
            has_refresh = session.refresh_token.is_some(),
            "Session restored"
        );

        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                store,
            }),
        }
    }

    /// Handle over a fresh in-memory store.
    pub fn in_memory(session: Session) -> Self {
        Self::bootstrap(Arc::new(MemorySessionStore::new(session)))
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.lock().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated()
    }

    /// Starts a session from a login or registration response.
    pub fn establish(&self, tokens: AuthTokens) -> Result<()> {
        self.update(|session| {
            session.user = tokens.user;
            session.access_token = Some(tokens.access_token);
            session.refresh_token = Some(tokens.refresh_token);
        })
    }

    /// Replaces both credentials after a successful renewal; identity is kept.
    pub fn rotate(&self, access_token: String, refresh_token: String) -> Result<()> {
        self.update(|session| {
            session.access_token = Some(access_token);
            session.refresh_token = Some(refresh_token);
        })
    }

    /// Drops identity and both credentials.
    pub fn clear(&self) -> Result<()> {
        self.update(|session| *session = Session::default())
    }

    /// Applies `f` and persists the result.
    ///
    /// Memory is updated even when persisting fails; the error is returned so
    /// the caller can decide whether that matters.
    fn update(&self, f: impl FnOnce(&mut Session)) -> Result<()> {
        let mut session = self.lock();
        f(&mut session);
        self.shared.store.save(&session)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.lock();
        f.debug_struct("SessionHandle")
            .field("user", &session.user.as_ref().map(|u| u.id.as_str()))
            .field("access_token", &session.access_token.as_deref().map(mask_token))
            .field("refresh_token", &session.refresh_token.as_deref().map(mask_token))
            .finish()
    }
}
