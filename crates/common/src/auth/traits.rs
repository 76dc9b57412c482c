//! Traits for token issuance, token persistence and credential lookup
//!
//! These traits enable dependency injection and testing by abstracting
//! external dependencies (the OAuth2 issuer, token storage backends, secret
//! sources).

use async_trait::async_trait;
use nimbus_domain::SdkError;

use super::types::{Credentials, Token};

/// Performs the OAuth2 client-credentials exchange
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Request a fresh token from the issuer.
    ///
    /// # Errors
    /// Returns [`SdkError::Auth`] if the issuer is unreachable, answers with a
    /// non-2xx status, or returns a body that does not parse into a token.
    async fn request_token(&self) -> Result<Token, SdkError>;
}

/// Persistence for the current token
///
/// `fetch_token` returns `Ok(None)` when nothing usable is stored; expired
/// tokens may still be returned and are filtered by the token manager.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored token.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] if the backend cannot be read.
    async fn fetch_token(&self) -> Result<Option<Token>, SdkError>;

    /// Load the token from the persistent backend, skipping any local cache.
    ///
    /// Used when the token at hand is too close to expiry, so that a token
    /// renewed by another process sharing the backend is picked up.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] if the backend cannot be read.
    async fn reload_token(&self) -> Result<Option<Token>, SdkError> {
        self.fetch_token().await
    }

    /// Persist `token`, replacing any previous value.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] if the backend cannot be written.
    async fn save_token(&self, token: &Token) -> Result<(), SdkError>;

    /// Forget the stored token.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] if the backend cannot be written.
    async fn clear_token(&self) -> Result<(), SdkError>;
}

/// Source of client credentials (`StaticCredentials`, `VaultCredentialsProvider`)
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Look up the client id and secret.
    ///
    /// # Errors
    /// Returns [`SdkError::Auth`] if the credentials cannot be obtained.
    async fn fetch_credentials(&self) -> Result<Credentials, SdkError>;
}

/// Credentials known at construction time
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    /// Wrap a fixed credential pair.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn fetch_credentials(&self) -> Result<Credentials, SdkError> {
        Ok(self.0.clone())
    }
}

/// Minimal key/value cache with expiry
///
/// `RedisCache` implements it over Redis; `RemoteCacheTokenStore` turns any
/// implementation into a token store.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Read `key`, `None` when missing or expired.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] on backend failure.
    async fn get(&self, key: &str) -> Result<Option<String>, SdkError>;

    /// Write `key` with a time-to-live.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] on backend failure.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: std::time::Duration,
    ) -> Result<(), SdkError>;

    /// Remove `key`.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] on backend failure.
    async fn delete(&self, key: &str) -> Result<(), SdkError>;
}
