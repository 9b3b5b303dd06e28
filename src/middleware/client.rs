use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use url::Url;

use super::request::{ApiRequest, RetryContext};
use crate::error::Error;
use crate::session::SessionManager;

/// HTTP client that attaches the session's bearer token and retries once
/// after a silent refresh on 401/403.
pub struct AuthenticatedClient {
    http: reqwest::Client,
    api_base: Url,
    session: Arc<SessionManager>,
}

impl AuthenticatedClient {
    /// Create a client resolving request paths against `api_base`
    /// (e.g. `https://app.example.com/api/`).
    #[must_use]
    pub fn new(mut api_base: Url, session: Arc<SessionManager>) -> Self {
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Self {
            http: reqwest::Client::new(),
            api_base,
            session,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Build a request for `path` relative to the API base.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `path` does not form a valid URL.
    pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest, Error> {
        let url = self.api_base.join(path.trim_start_matches('/'))?;
        Ok(ApiRequest::new(method, url))
    }

    /// `GET {api_base}/{path}`.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, Error> {
        self.execute(self.request(Method::GET, path)?).await
    }

    /// `POST {api_base}/{path}` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, Error> {
        self.execute(self.request(Method::POST, path)?.json(body)?).await
    }

    /// Send `request`, refreshing the session and replaying it once if the
    /// server answers 401/403.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] for non-2xx responses. When the silent refresh
    /// is impossible or fails, the original 401/403 is returned unchanged.
    /// Returns [`Error::Http`] on network failure.
    pub async fn execute(&self, request: ApiRequest) -> Result<reqwest::Response, Error> {
        self.dispatch(&request, RetryContext::new()).await
    }

    /// Headers `request` is sent with: its own, plus the bearer credential
    /// unless it opted out of authentication.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] if the stored token cannot be used as
    /// a header value.
    pub fn authorize(&self, request: &ApiRequest) -> Result<HeaderMap, Error> {
        let mut headers = request.headers.clone();
        if request.skip_auth {
            return Ok(headers);
        }
        if let Some(token) = self.session.access_token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|_| Error::InvalidToken("access token is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        mut ctx: RetryContext,
    ) -> Result<reqwest::Response, Error> {
        loop {
            let error = match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !ctx.should_refresh(request, &error) {
                return Err(error);
            }
            ctx.mark_retried();

            if !self.refresh_for_retry().await {
                return Err(error);
            }
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                "Replaying request with refreshed token"
            );
        }
    }

    /// Refresh on behalf of a failed request. Failures are logged and
    /// reported as `false` so the caller surfaces the original error.
    async fn refresh_for_retry(&self) -> bool {
        if self.session.refresh_token().is_none() {
            tracing::debug!("No refresh token, not retrying");
            return false;
        }
        match self.session.refresh_access_token().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Silent token refresh failed");
                false
            }
        }
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<reqwest::Response, Error> {
        let headers = self.authorize(request)?;
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status, url = %request.url, "API request failed");
        Err(Error::Api { status, body })
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("api_base", &self.api_base.as_str())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
