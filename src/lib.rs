#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod middleware;
pub mod session;
pub mod store;
pub mod token;
pub mod types;
pub mod view;

// Re-exports for convenient access
pub use config::SessionConfig;
pub use error::Error;
pub use middleware::{ApiRequest, AuthenticatedClient, RetryContext};
pub use session::{SessionManager, TokenInfo, TokenResponse};
pub use store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, TokenStore};
pub use token::{Audience, Claims, decode_claims};
pub use types::{AccessToken, RefreshToken};
pub use view::View;
