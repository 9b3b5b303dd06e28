//! Session token storage.
//!
//! [`TokenStore`] keeps the current access/refresh tokens and the decoded
//! claim set in memory and mirrors every change to a [`KeyValueStore`]:
//! - [`MemoryKeyValueStore`] - in-process map (tests, ephemeral sessions)
//! - [`FileKeyValueStore`] - JSON file with 0600 permissions

mod file;
mod memory;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;

use crate::error::Error;
use crate::token::{Claims, decode_claims};
use crate::types::{AccessToken, RefreshToken};

/// Persistence key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "kc_token";
/// Persistence key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "kc_refresh_token";

/// Durable string key-value persistence.
///
/// Implementations must be cheap and synchronous: every token change is
/// mirrored immediately after the in-memory update.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    fn remove(&self, key: &str) -> Result<(), Error>;

    /// Name of this storage backend.
    fn name(&self) -> &str {
        "unknown"
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), Error> {
        (**self).remove(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Outer `None`: not yet read from persistence nor written. Once a field is
/// set or cleared, persistence is never consulted for it again, so a failed
/// `remove` cannot bring a cleared token back.
#[derive(Default)]
struct SessionState {
    access: Option<Option<AccessToken>>,
    refresh: Option<Option<RefreshToken>>,
    // Always derived from `access`.
    claims: Option<Claims>,
}

impl SessionState {
    fn cleared() -> Self {
        Self {
            access: Some(None),
            refresh: Some(None),
            claims: None,
        }
    }
}

/// In-memory session tokens backed by durable persistence.
///
/// Each token is read from persistence lazily on first use, so a store
/// built over previously written persistence resumes the old session.
/// Only [`SessionManager`](crate::SessionManager) writes.
pub struct TokenStore {
    state: Mutex<SessionState>,
    persistence: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    #[must_use]
    pub fn new(persistence: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            persistence,
        }
    }

    /// Current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        let mut state = self.lock();
        self.hydrate_access(&mut state);
        state.access.clone().flatten()
    }

    /// Current refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        let mut state = self.lock();
        self.hydrate_refresh(&mut state);
        state.refresh.clone().flatten()
    }

    /// Claims of the current access token. `None` when there is no token or
    /// its payload is unreadable.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        let mut state = self.lock();
        self.hydrate_access(&mut state);
        state.claims.clone()
    }

    /// Eagerly restores both tokens from persistence. Returns whether an
    /// access token is now present.
    pub fn hydrate(&self) -> bool {
        let mut state = self.lock();
        self.hydrate_access(&mut state);
        self.hydrate_refresh(&mut state);
        tracing::debug!(
            backend = self.persistence.name(),
            has_access = matches!(state.access, Some(Some(_))),
            has_refresh = matches!(state.refresh, Some(Some(_))),
            "Token store hydrated"
        );
        matches!(state.access, Some(Some(_)))
    }

    pub(crate) fn set_access_token(&self, token: AccessToken) {
        let mut state = self.lock();
        state.claims = decode_claims(token.as_str());
        self.persist(ACCESS_TOKEN_KEY, Some(token.as_str()));
        state.access = Some(Some(token));
    }

    pub(crate) fn set_refresh_token(&self, token: RefreshToken) {
        let mut state = self.lock();
        self.persist(REFRESH_TOKEN_KEY, Some(token.as_str()));
        state.refresh = Some(Some(token));
    }

    pub(crate) fn clear_refresh_token(&self) {
        let mut state = self.lock();
        state.refresh = Some(None);
        self.persist(REFRESH_TOKEN_KEY, None);
    }

    /// Drops both tokens and the claim set, in memory and in persistence.
    pub(crate) fn clear(&self) {
        let mut state = self.lock();
        *state = SessionState::cleared();
        self.persist(ACCESS_TOKEN_KEY, None);
        self.persist(REFRESH_TOKEN_KEY, None);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hydrate_access(&self, state: &mut SessionState) {
        if state.access.is_some() {
            return;
        }
        let raw = self.load(ACCESS_TOKEN_KEY);
        state.claims = raw.as_deref().and_then(decode_claims);
        state.access = Some(raw.map(AccessToken));
    }

    fn hydrate_refresh(&self, state: &mut SessionState) {
        if state.refresh.is_none() {
            state.refresh = Some(self.load(REFRESH_TOKEN_KEY).map(RefreshToken));
        }
    }

    fn load(&self, key: &str) -> Option<String> {
        match self.persistence.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read persisted token");
                None
            }
        }
    }

    fn persist(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(v) => self.persistence.set(key, v),
            None => self.persistence.remove(key),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Failed to persist token change");
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("backend", &self.persistence.name())
            .finish_non_exhaustive()
    }
}
