use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::store::{KeyValueStore, TokenStore};
use crate::token::{Audience, Claims};
use crate::types::{AccessToken, RefreshToken};
use crate::view::View;

type LogoutHook = Box<dyn Fn(View) + Send + Sync>;

/// Token response from the identity provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: AccessToken,
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Normalized subset of the current access token's claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct TokenInfo {
    pub preferred_username: Option<String>,
    pub aud: Option<Audience>,
    pub azp: Option<String>,
    pub iss: Option<String>,
    pub exp: Option<i64>,
}

impl TokenInfo {
    fn from_claims(claims: &Claims) -> Self {
        Self {
            preferred_username: claims.preferred_username().map(str::to_owned),
            aud: claims.aud(),
            azp: claims.azp().map(str::to_owned),
            iss: claims.iss().map(str::to_owned),
            exp: claims.exp(),
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.exp
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
    }
}

/// Owns the session lifecycle: login, refresh, manual token override, logout.
///
/// The only writer of its [`TokenStore`]. Construct one at startup and share
/// it (`Arc<SessionManager>`) with everything that needs the session.
///
/// ```rust,ignore
/// let session = SessionManager::new(SessionConfig::from_env()?, Arc::new(FileKeyValueStore::new(path)))
///     .with_logout_hook(|view| router.navigate(view.path()));
/// session.restore();
/// session.login("alice", "secret").await?;
/// ```
pub struct SessionManager {
    config: SessionConfig,
    http: reqwest::Client,
    store: TokenStore,
    logout_hooks: Vec<LogoutHook>,
}

impl SessionManager {
    /// Create a session manager over the given persistence. Nothing is read
    /// until the first query or an explicit [`restore`](Self::restore).
    #[must_use]
    pub fn new(config: SessionConfig, persistence: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            store: TokenStore::new(persistence),
            logout_hooks: Vec::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Register an action run after [`logout`](Self::logout) with the view
    /// the client must return to.
    #[must_use]
    pub fn with_logout_hook(mut self, hook: impl Fn(View) + Send + Sync + 'static) -> Self {
        self.logout_hooks.push(Box::new(hook));
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Restore a persisted session. Returns whether one exists.
    pub fn restore(&self) -> bool {
        self.store.hydrate()
    }

    /// Authenticate with the resource-owner password grant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] when the provider rejects the
    /// credentials, [`Error::Http`] on network failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("username", username),
            ("password", password),
        ];

        let tokens = self
            .post_token_form(&params, |status, detail| Error::Authentication {
                status,
                detail,
            })
            .await
            .inspect_err(|e| tracing::warn!(username, error = %e, "Login failed"))?;

        self.store.set_access_token(tokens.access_token.clone());
        match &tokens.refresh_token {
            Some(rt) => self.store.set_refresh_token(rt.clone()),
            None => self.store.clear_refresh_token(),
        }

        tracing::info!(
            username,
            refreshable = tokens.refresh_token.is_some(),
            "Logged in"
        );
        Ok(tokens)
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Keeps the previous refresh token when the provider does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRefreshToken`] without a stored refresh token,
    /// [`Error::RefreshRejected`] when the provider refuses it, or
    /// [`Error::Http`] on network failure.
    pub async fn refresh_access_token(&self) -> Result<TokenResponse, Error> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or(Error::MissingRefreshToken)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];

        let tokens = self
            .post_token_form(&params, |status, detail| Error::RefreshRejected {
                status,
                detail,
            })
            .await?;

        self.store.set_access_token(tokens.access_token.clone());
        if let Some(rotated) = &tokens.refresh_token {
            self.store.set_refresh_token(rotated.clone());
        }

        tracing::info!(rotated = tokens.refresh_token.is_some(), "Access token refreshed");
        Ok(tokens)
    }

    /// End the session: clear memory and persistence, then send the client
    /// back to the login view.
    pub fn logout(&self) {
        self.store.clear();
        tracing::info!("Logged out");
        let landing = View::landing(false);
        for hook in &self.logout_hooks {
            hook(landing);
        }
    }

    /// Install a manually supplied access token (e.g. pasted by the user).
    ///
    /// Any stored refresh token is discarded: it belongs to a different
    /// session and must not be used to renew this one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] if `token` is blank. The session is
    /// left untouched in that case.
    pub fn set_access_token(&self, token: &str) -> Result<(), Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidToken("access token is empty"));
        }

        self.store.set_access_token(AccessToken(token.to_owned()));
        self.store.clear_refresh_token();
        tracing::info!(decodable = self.store.claims().is_some(), "Access token set manually");
        Ok(())
    }

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.store.access_token()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.store.refresh_token()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.access_token().is_some()
    }

    /// Claim summary of the current access token, or `None` without a
    /// decodable token.
    #[must_use]
    pub fn token_info(&self) -> Option<TokenInfo> {
        self.store.claims().as_ref().map(TokenInfo::from_claims)
    }

    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.store
            .claims()
            .and_then(|c| c.preferred_username().map(str::to_owned))
    }

    #[must_use]
    pub fn roles(&self) -> BTreeSet<String> {
        self.store
            .claims()
            .map(|c| c.roles())
            .unwrap_or_default()
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
        reject: fn(u16, String) -> Error,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(reject(status, detail));
        }
        response.json::<TokenResponse>().await.map_err(Into::into)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("logout_hooks", &self.logout_hooks.len())
            .finish()
    }
}
