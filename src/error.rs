#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity provider rejected the password grant.
    #[error("authentication failed (HTTP {status}): {detail}")]
    Authentication { status: u16, detail: String },

    #[error("missing refresh token")]
    MissingRefreshToken,

    /// The identity provider rejected the refresh grant (expired, revoked, ...).
    #[error("refresh token rejected (HTTP {status}): {detail}")]
    RefreshRejected { status: u16, detail: String },

    #[error("invalid access token: {0}")]
    InvalidToken(&'static str),

    /// Non-2xx response from the application API.
    #[error("request failed with HTTP {status}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::RefreshRejected { status, .. }
            | Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for 401/403 responses from the application API.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}
