//! Bearer-token middleware for outbound API requests.
//!
//! [`AuthenticatedClient`] wraps `reqwest` with two phases:
//!
//! - **request**: attach `Authorization: Bearer <token>` from the
//!   [`SessionManager`](crate::SessionManager), unless the request opted out
//!   with [`ApiRequest::skip_auth`].
//! - **response**: on 401/403, refresh the session once and replay the
//!   request. If no refresh is possible, or it fails, the original error is
//!   returned as-is.
//!
//! ```rust,ignore
//! let api = AuthenticatedClient::new("https://app.example.com/api/".parse()?, session.clone());
//! let articles = api.get("articles").await?.json::<Vec<Article>>().await?;
//! let public = api.execute(api.request(Method::GET, "articles/search")?.skip_auth()).await?;
//! ```

mod client;
mod request;

pub use client::AuthenticatedClient;
pub use request::{ApiRequest, RetryContext};
