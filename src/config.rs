use url::Url;

use crate::error::Error;

/// Identity-provider settings for the password and refresh grants.
///
/// ```rust,ignore
/// use oidc_session::SessionConfig;
///
/// let config = SessionConfig::new("http://localhost:8180".parse()?, "demo", "web-ui")?;
/// assert_eq!(
///     config.token_url().as_str(),
///     "http://localhost:8180/realms/demo/protocol/openid-connect/token"
/// );
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    pub(crate) base_url: Url,
    pub(crate) realm: String,
    pub(crate) client_id: String,
    pub(crate) token_url: Url,
}

impl SessionConfig {
    /// Create a configuration, deriving the token endpoint as
    /// `{base_url}/realms/{realm}/protocol/openid-connect/token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `realm` or `client_id` is blank, or the
    /// base URL cannot carry a path (e.g. `mailto:`).
    pub fn new(
        base_url: Url,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Result<Self, Error> {
        let realm = realm.into();
        let client_id = client_id.into();
        if realm.trim().is_empty() {
            return Err(Error::Config("realm must not be empty".into()));
        }
        if client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".into()));
        }

        let mut token_url = base_url.clone();
        token_url
            .path_segments_mut()
            .map_err(|()| Error::Config(format!("base URL cannot be a base: {base_url}")))?
            .pop_if_empty()
            .extend(["realms", realm.as_str(), "protocol", "openid-connect", "token"]);

        Ok(Self {
            base_url,
            realm,
            client_id,
            token_url,
        })
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `OIDC_BASE_URL`: identity provider base URL
    /// - `OIDC_REALM`: realm name
    /// - `OIDC_CLIENT_ID`: public client identifier
    ///
    /// # Optional env vars
    /// - `OIDC_TOKEN_URL`: override the derived token endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or URLs are invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base_url: Url = require_env("OIDC_BASE_URL")?
            .parse()
            .map_err(|e| Error::Config(format!("OIDC_BASE_URL: {e}")))?;
        let realm = require_env("OIDC_REALM")?;
        let client_id = require_env("OIDC_CLIENT_ID")?;

        let mut config = Self::new(base_url, realm, client_id)?;

        if let Ok(url_str) = std::env::var("OIDC_TOKEN_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("OIDC_TOKEN_URL: {e}")))?;
            config = config.with_token_url(url);
        }

        Ok(config)
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Identity provider base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Token endpoint URL (password and refresh grants).
    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }
}

fn require_env(name: &str) -> Result<String, Error> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("{name} is required")))
}
