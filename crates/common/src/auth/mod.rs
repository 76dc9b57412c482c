//! Bearer token lifecycle for the OAuth2 client-credentials grant
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  TokenManager   │  Current token, refresh-before-expiry, single flight
//! └────────┬────────┘
//!          │
//!          ├──► TokenIssuer         (OAuthTokenIssuer: POST to token URL)
//!          │         │
//!          │         └──► CredentialsProvider (static, Vault AppRole + KV v2)
//!          │
//!          └──► TokenStore          (memory, file, Redis, cached)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use nimbus_common::auth::{
//!     Credentials, MemoryTokenStore, OAuthTokenIssuer, StaticCredentials, TokenManager,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Arc::new(StaticCredentials::new(Credentials::new("id", "secret")));
//!     let issuer = OAuthTokenIssuer::new("https://login.example.com/token", credentials)?;
//!     let manager = TokenManager::new(
//!         Arc::new(issuer),
//!         Arc::new(MemoryTokenStore::new()),
//!         Duration::from_secs(300),
//!     );
//!
//!     let cancel = CancellationToken::new();
//!     manager.obtain_token(&cancel).await?;
//!     let bearer = manager.get_token(&cancel).await?;
//!     println!("Authorization: Bearer {bearer}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod redis_cache;
pub mod store;
pub mod token_manager;
pub mod traits;
pub mod types;
pub mod vault;

pub use client::{OAuthTokenIssuer, DEFAULT_ISSUER_TIMEOUT};
pub use redis_cache::RedisCache;
pub use store::{CachedTokenStore, FileTokenStore, MemoryTokenStore, RemoteCacheTokenStore};
pub use token_manager::TokenManager;
pub use traits::{CredentialsProvider, KeyValueCache, StaticCredentials, TokenIssuer, TokenStore};
pub use types::{Credentials, Token, TokenResponse};
pub use vault::VaultCredentialsProvider;
