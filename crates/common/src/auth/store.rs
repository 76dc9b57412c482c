//! Token persistence backends
//!
//! - [`MemoryTokenStore`]: process local, lost on restart
//! - [`FileTokenStore`]: `<base_dir>/<client_id>.token.json`, owner-only
//!   permissions on Unix
//! - [`RemoteCacheTokenStore`]: any [`KeyValueCache`] (e.g. Redis), expiring
//!   with the token
//! - [`CachedTokenStore`]: in-memory front for one of the above, with
//!   optional expiration drift so that several processes sharing a backend do
//!   not all refresh at the same instant

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimbus_domain::SdkError;
use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::traits::{KeyValueCache, TokenStore};
use super::types::Token;

/// Lower bound for the TTL of tokens written to a remote cache.
pub const MIN_REMOTE_TTL: Duration = Duration::from_secs(1);

/// TTL used for tokens that carry no expiry.
pub const NON_EXPIRING_REMOTE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Volatile in-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<Token>>,
}

impl MemoryTokenStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn fetch_token(&self) -> Result<Option<Token>, SdkError> {
        Ok(self.token.read().clone())
    }

    async fn save_token(&self, token: &Token) -> Result<(), SdkError> {
        *self.token.write() = Some(token.clone());
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), SdkError> {
        *self.token.write() = None;
        Ok(())
    }
}

/// JSON file per client id
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store tokens for `client_id` under `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl AsRef<Path>, client_id: &str) -> Self {
        let file_name = format!("{}.token.json", sanitize_key(client_id));
        Self { path: base_dir.as_ref().join(file_name) }
    }

    /// Location of the token file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn fetch_token(&self) -> Result<Option<Token>, SdkError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("failed to read token file", &e)),
        };
        let token = serde_json::from_slice(&contents)
            .map_err(|e| SdkError::Storage(format!("corrupt token file: {e}")))?;
        Ok(Some(token))
    }

    async fn save_token(&self, token: &Token) -> Result<(), SdkError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| storage_error("failed to create token directory", &e))?;
            restrict_permissions(dir, 0o700).await?;
        }

        let json = serde_json::to_vec(token)
            .map_err(|e| SdkError::Storage(format!("failed to encode token: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error("failed to write token file", &e))?;
        restrict_permissions(&tmp, 0o600).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error("failed to replace token file", &e))?;

        debug!(path = %self.path.display(), "token persisted");
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), SdkError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("failed to delete token file", &e)),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> Result<(), SdkError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| storage_error("failed to set token file permissions", &e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), SdkError> {
    Ok(())
}

fn storage_error(context: &str, err: &std::io::Error) -> SdkError {
    SdkError::Storage(format!("{context}: {err}"))
}

fn sanitize_key(client_id: &str) -> String {
    client_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// Token store backed by a remote key/value cache
pub struct RemoteCacheTokenStore<C: KeyValueCache> {
    cache: C,
    key: String,
}

impl<C: KeyValueCache> RemoteCacheTokenStore<C> {
    /// Store the token for `client_id` in `cache`.
    pub fn new(cache: C, client_id: &str) -> Self {
        Self { cache, key: format!("nimbus:token:{}", sanitize_key(client_id)) }
    }

    /// Cache key used for this client
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl<C: KeyValueCache> TokenStore for RemoteCacheTokenStore<C> {
    async fn fetch_token(&self) -> Result<Option<Token>, SdkError> {
        let Some(raw) = self.cache.get(&self.key).await? else {
            return Ok(None);
        };
        let token = serde_json::from_str(&raw)
            .map_err(|e| SdkError::Storage(format!("corrupt cached token: {e}")))?;
        Ok(Some(token))
    }

    async fn save_token(&self, token: &Token) -> Result<(), SdkError> {
        let ttl = token.remaining().map_or(NON_EXPIRING_REMOTE_TTL, |r| r.max(MIN_REMOTE_TTL));
        let json = serde_json::to_string(token)
            .map_err(|e| SdkError::Storage(format!("failed to encode token: {e}")))?;
        self.cache.set_with_ttl(&self.key, json, ttl).await
    }

    async fn clear_token(&self) -> Result<(), SdkError> {
        self.cache.delete(&self.key).await
    }
}

/// In-memory cache in front of a persistent [`TokenStore`]
///
/// Cache misses are serialized: concurrent callers that miss wait for the
/// first one to load from the backend and then reuse its result.
pub struct CachedTokenStore {
    backend: Arc<dyn TokenStore>,
    cached: RwLock<Option<Token>>,
    load_lock: AsyncMutex<()>,
    max_drift_secs: u64,
}

impl CachedTokenStore {
    /// Cache `backend` without drift.
    #[must_use]
    pub fn new(backend: Arc<dyn TokenStore>) -> Self {
        Self { backend, cached: RwLock::new(None), load_lock: AsyncMutex::new(()), max_drift_secs: 0 }
    }

    /// Subtract a random `1..=max_drift_secs` seconds from cached expiries.
    #[must_use]
    pub fn with_max_drift(mut self, max_drift_secs: u64) -> Self {
        self.max_drift_secs = max_drift_secs;
        self
    }

    fn cached_valid(&self) -> Option<Token> {
        self.cached.read().clone().filter(Token::is_valid)
    }

    /// Read the backend and replace the cached copy. Caller holds
    /// `load_lock`.
    async fn load_from_backend(&self) -> Option<Token> {
        let loaded = match self.backend.fetch_token().await {
            Ok(token) => token.filter(Token::is_valid),
            Err(e) => {
                warn!(error = %e, "token backend unavailable, treating as empty");
                None
            }
        };
        let drifted = loaded.map(|t| t.with_drift(self.drift()));
        self.cached.write().clone_from(&drifted);
        drifted
    }

    fn drift(&self) -> Duration {
        if self.max_drift_secs == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(rand::thread_rng().gen_range(1..=self.max_drift_secs))
    }
}

#[async_trait]
impl TokenStore for CachedTokenStore {
    async fn fetch_token(&self) -> Result<Option<Token>, SdkError> {
        if let Some(token) = self.cached_valid() {
            return Ok(Some(token));
        }

        let _guard = self.load_lock.lock().await;
        if let Some(token) = self.cached_valid() {
            return Ok(Some(token));
        }
        Ok(self.load_from_backend().await)
    }

    async fn reload_token(&self) -> Result<Option<Token>, SdkError> {
        let _guard = self.load_lock.lock().await;
        Ok(self.load_from_backend().await)
    }

    async fn save_token(&self, token: &Token) -> Result<(), SdkError> {
        self.backend.save_token(token).await?;
        *self.cached.write() = Some(token.with_drift(self.drift()));
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), SdkError> {
        *self.cached.write() = None;
        self.backend.clear_token().await
    }
}
