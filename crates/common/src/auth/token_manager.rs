//! Token manager with refresh-before-expiry
//!
//! Manages the bearer token lifecycle:
//! - Initial issuance (fail-fast at client construction)
//! - Transparent refresh once the token is within the refresh buffer
//! - Single in-flight refresh under concurrent callers
//! - Persistence through a pluggable [`TokenStore`]
//!
//! # Refresh discipline
//!
//! Refreshes are strictly serialized. A caller that finds the token stale
//! takes the refresh lock; callers arriving meanwhile wait on the same lock
//! and, once they get it, notice through the refresh generation that a new
//! token was issued while they waited and return it without issuing again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nimbus_domain::SdkError;
use parking_lot::RwLock;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::traits::{TokenIssuer, TokenStore};
use super::types::Token;

/// Thread-safe owner of the current bearer token
pub struct TokenManager {
    issuer: Arc<dyn TokenIssuer>,
    store: Arc<dyn TokenStore>,
    refresh_buffer: Duration,
    current: RwLock<Option<Token>>,
    generation: AtomicU64,
    refresh_lock: AsyncMutex<()>,
}

impl TokenManager {
    /// Create a token manager
    ///
    /// # Arguments
    /// * `issuer` - Performs the client-credentials exchange
    /// * `store` - Persists issued tokens
    /// * `refresh_buffer` - Renew tokens this long before expiry (default
    ///   configuration: 300 s)
    #[must_use]
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        store: Arc<dyn TokenStore>,
        refresh_buffer: Duration,
    ) -> Self {
        Self {
            issuer,
            store,
            refresh_buffer,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    /// Unconditionally issue a new token and make it current.
    ///
    /// Called once when the owning client is constructed.
    ///
    /// # Errors
    /// Returns [`SdkError::Auth`] if issuance fails and
    /// [`SdkError::Cancelled`] if `cancel` fires first. The current token is
    /// left untouched on failure.
    pub async fn obtain_token(&self, cancel: &CancellationToken) -> Result<Token, SdkError> {
        let _guard = self.lock_refresh(cancel).await?;
        self.issue(cancel).await
    }

    /// Return an access token valid for at least the refresh buffer.
    ///
    /// Refreshes first when the current token is missing, expired or inside
    /// the refresh buffer.
    ///
    /// # Errors
    /// Propagates issuance failures; never returns a stale token instead.
    /// Returns [`SdkError::Cancelled`] if `cancel` fires while waiting.
    pub async fn get_token(&self, cancel: &CancellationToken) -> Result<String, SdkError> {
        if cancel.is_cancelled() {
            return Err(SdkError::Cancelled);
        }

        let observed = self.generation.load(Ordering::Acquire);
        if let Some(token) = self.fresh_token() {
            return Ok(token.access_token);
        }

        let _guard = self.lock_refresh(cancel).await?;

        if let Some(token) = self.fresh_token() {
            return Ok(token.access_token);
        }
        if self.generation.load(Ordering::Acquire) != observed {
            // Refreshed while we waited; accept it even if the issuer hands
            // out lifetimes shorter than the buffer.
            if let Some(token) = self.current_token().filter(Token::is_valid) {
                debug!("reusing token refreshed by a concurrent caller");
                return Ok(token.access_token);
            }
        }

        if let Some(token) = self.load_from_store().await {
            return Ok(token.access_token);
        }

        debug!(buffer_secs = self.refresh_buffer.as_secs(), "token stale, refreshing");
        let token = self.issue(cancel).await?;
        Ok(token.access_token)
    }

    /// Snapshot of the current token, if any (no refresh).
    #[must_use]
    pub fn token_info(&self) -> Option<Token> {
        self.current_token()
    }

    /// Whether a token is held and has not expired.
    #[must_use]
    pub fn is_token_valid(&self) -> bool {
        self.current_token().is_some_and(|t| t.is_valid())
    }

    /// Time left before the current token expires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.current_token().and_then(|t| t.remaining())
    }

    /// Configured refresh buffer
    #[must_use]
    pub const fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    /// Number of tokens issued by this manager so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Drop the current token from memory and from the store.
    ///
    /// # Errors
    /// Returns [`SdkError::Storage`] if the store cannot be cleared.
    pub async fn clear(&self) -> Result<(), SdkError> {
        let _guard = self.refresh_lock.lock().await;
        *self.current.write() = None;
        self.store.clear_token().await?;
        info!("token cleared");
        Ok(())
    }

    fn current_token(&self) -> Option<Token> {
        self.current.read().clone()
    }

    fn fresh_token(&self) -> Option<Token> {
        self.current_token().filter(|t| t.is_valid() && !t.expires_within(self.refresh_buffer))
    }

    async fn lock_refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard<'_, ()>, SdkError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SdkError::Cancelled),
            guard = self.refresh_lock.lock() => Ok(guard),
        }
    }

    /// Adopt a fresh token persisted by another process. Caller holds the
    /// refresh lock.
    ///
    /// Reads past any cache in front of the store: the cached copy may be
    /// the very token that was just found stale.
    async fn load_from_store(&self) -> Option<Token> {
        match self.store.reload_token().await {
            Ok(Some(token)) if token.is_valid() && !token.expires_within(self.refresh_buffer) => {
                debug!("adopted token from store");
                *self.current.write() = Some(token.clone());
                Some(token)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to read token store");
                None
            }
        }
    }

    /// Issue and publish a token. Caller holds the refresh lock.
    async fn issue(&self, cancel: &CancellationToken) -> Result<Token, SdkError> {
        let token = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SdkError::Cancelled),
            result = self.issuer.request_token() => result?,
        };

        if let Err(e) = self.store.save_token(&token).await {
            warn!(error = %e, "failed to persist token, keeping it in memory only");
        }

        let remaining_secs = token.remaining().map(|r| r.as_secs());
        if let Some(remaining) = token.remaining() {
            if remaining <= self.refresh_buffer {
                warn!(
                    remaining_secs = remaining.as_secs(),
                    buffer_secs = self.refresh_buffer.as_secs(),
                    "issued token lifetime is shorter than the refresh buffer"
                );
            }
        }

        *self.current.write() = Some(token.clone());
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(generation, remaining_secs, "token issued");

        Ok(token)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("refresh_buffer", &self.refresh_buffer)
            .field("generation", &self.generation())
            .field("has_token", &self.current.read().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryTokenStore;
    use crate::testing::mocks::MockTokenIssuer;

    const BUFFER: Duration = Duration::from_secs(300);

    fn manager(issuer: &Arc<MockTokenIssuer>) -> TokenManager {
        TokenManager::new(issuer.clone(), Arc::new(MemoryTokenStore::new()), BUFFER)
    }

    /// Validates that a fresh token is served without re-issuance.
    ///
    /// Assertions:
    /// - Confirms `obtain_token` performs one issuance.
    /// - Confirms repeated `get_token` calls reuse it.
    #[tokio::test]
    async fn test_fresh_token_is_reused() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
        let manager = manager(&issuer);
        let cancel = CancellationToken::new();

        let token = manager.obtain_token(&cancel).await.unwrap();
        assert_eq!(token.access_token, "token-1");

        for _ in 0..5 {
            assert_eq!(manager.get_token(&cancel).await.unwrap(), "token-1");
        }
        assert_eq!(issuer.call_count(), 1);
        assert!(manager.is_token_valid());
        assert!(manager.remaining().unwrap() > BUFFER);
    }

    /// Validates that a token inside the buffer is refreshed.
    ///
    /// Assertions:
    /// - Confirms the next `get_token` returns a newly issued token.
    /// - Confirms the generation advances to 2.
    #[tokio::test]
    async fn test_stale_token_is_refreshed() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(60)));
        let manager = manager(&issuer);
        let cancel = CancellationToken::new();

        manager.obtain_token(&cancel).await.unwrap();
        issuer.set_lifetime(Duration::from_secs(3600));

        assert_eq!(manager.get_token(&cancel).await.unwrap(), "token-2");
        assert_eq!(manager.generation(), 2);
        assert_eq!(manager.get_token(&cancel).await.unwrap(), "token-2");
        assert_eq!(issuer.call_count(), 2);
    }

    /// Validates that a missing token is issued on first use.
    #[tokio::test]
    async fn test_missing_token_is_issued_lazily() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
        let manager = manager(&issuer);

        assert!(manager.token_info().is_none());
        assert_eq!(manager.get_token(&CancellationToken::new()).await.unwrap(), "token-1");
    }

    /// Validates that refresh failures propagate instead of returning the
    /// stale token.
    ///
    /// Assertions:
    /// - Ensures `get_token` returns the issuer's auth error.
    /// - Confirms the previous token is still the current one.
    #[tokio::test]
    async fn test_refresh_failure_propagates() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(60)));
        let manager = manager(&issuer);
        let cancel = CancellationToken::new();
        manager.obtain_token(&cancel).await.unwrap();

        issuer.fail_with(Some(SdkError::auth("issuer down")));
        let err = manager.get_token(&cancel).await.unwrap_err();
        assert!(matches!(err, SdkError::Auth { .. }));
        assert_eq!(manager.token_info().unwrap().access_token, "token-1");
    }

    /// Validates that a token persisted by another process is adopted.
    #[tokio::test]
    async fn test_adopts_token_from_store() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
        let store = Arc::new(MemoryTokenStore::new());
        store.save_token(&Token::bearer("persisted", Duration::from_secs(3600))).await.unwrap();

        let manager = TokenManager::new(issuer.clone(), store, BUFFER);
        assert_eq!(manager.get_token(&CancellationToken::new()).await.unwrap(), "persisted");
        assert_eq!(issuer.call_count(), 0);
    }

    /// Validates that a cancelled caller does not wait for someone else's
    /// refresh.
    ///
    /// Assertions:
    /// - Ensures the waiting caller returns `Cancelled` promptly.
    /// - Confirms the in-flight refresh still completes for its own caller.
    #[tokio::test]
    async fn test_cancel_while_waiting_for_refresh() {
        let issuer =
            Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)).with_delay(Duration::from_millis(300)));
        let manager = Arc::new(manager(&issuer));

        let refresher = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_token(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = manager.get_token(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_millis(250));

        assert_eq!(refresher.await.unwrap().unwrap(), "token-1");
        assert_eq!(issuer.call_count(), 1);
    }

    /// Validates that `clear` forgets the token.
    #[tokio::test]
    async fn test_clear() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
        let manager = manager(&issuer);
        manager.obtain_token(&CancellationToken::new()).await.unwrap();

        manager.clear().await.unwrap();
        assert!(manager.token_info().is_none());
        assert!(!manager.is_token_valid());
    }
}
