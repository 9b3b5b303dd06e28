use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use url::Url;

use crate::error::Error;

/// Outbound API request.
///
/// The body is buffered so the request can be replayed unchanged after a
/// token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(super) method: Method,
    pub(super) url: Url,
    pub(super) headers: HeaderMap,
    pub(super) body: Option<Vec<u8>>,
    pub(super) skip_auth: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            skip_auth: false,
        }
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Send without credentials, even when a session exists.
    ///
    /// For public endpoints where a stale token would make the server try,
    /// and fail, to authenticate instead of serving the request anonymously.
    #[must_use]
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn is_skip_auth(&self) -> bool {
        self.skip_auth
    }
}

/// Retry marker for one logical request, including its single replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    retried: bool,
}

impl RetryContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_retried(&self) -> bool {
        self.retried
    }

    /// Whether `error` on `request` warrants a refresh-and-replay.
    #[must_use]
    pub fn should_refresh(&self, request: &ApiRequest, error: &Error) -> bool {
        !self.retried && !request.skip_auth && error.is_auth_failure()
    }

    pub(super) fn mark_retried(&mut self) {
        self.retried = true;
    }
}
