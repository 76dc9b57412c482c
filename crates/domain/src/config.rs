//! Client configuration structures

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, SdkError};

/// Default margin before expiry at which a token is renewed.
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;

/// Default HTTP timeout for resource calls.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Top level configuration for a `CloudClient`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    /// Token issuance settings
    pub auth: AuthConfig,
    /// Transport settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Static headers added to every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Where issued tokens are persisted
    #[serde(default)]
    pub token_store: TokenStoreConfig,
}

impl ClientConfig {
    /// Build a configuration with default transport and in-memory token
    /// storage.
    pub fn new(base_url: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            http: HttpConfig::default(),
            headers: BTreeMap::new(),
            token_store: TokenStoreConfig::default(),
        }
    }

    /// Check that every required field is present and well formed.
    ///
    /// # Errors
    /// Returns [`SdkError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_url("base_url", &self.base_url)?;
        self.auth.validate()?;
        if self.http.timeout_secs == 0 {
            return Err(SdkError::Config("http.timeout_secs must be greater than 0".into()));
        }
        self.token_store.validate()
    }
}

/// OAuth2 client-credentials settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token endpoint
    pub issuer_url: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    #[serde(skip_serializing, default)]
    pub client_secret: String,
    /// Seconds before expiry at which the token is renewed
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,
    /// Optional scopes sent with the grant
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Read the client secret from Vault instead of `client_secret`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultConfig>,
}

impl AuthConfig {
    /// Credentials with the default refresh buffer and no scopes.
    pub fn new(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            scopes: Vec::new(),
            vault: None,
        }
    }

    /// Credentials looked up in Vault; `client_secret` stays empty.
    pub fn with_vault(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        vault: VaultConfig,
    ) -> Self {
        Self { vault: Some(vault), ..Self::new(issuer_url, client_id, String::new()) }
    }

    /// Refresh buffer as a [`Duration`].
    pub const fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    /// # Errors
    /// Returns [`SdkError::Config`] when the issuer URL is invalid, a
    /// credential is empty, or both a secret and Vault are configured.
    pub fn validate(&self) -> Result<()> {
        validate_url("auth.issuer_url", &self.issuer_url)?;
        if self.client_id.trim().is_empty() {
            return Err(SdkError::Config("auth.client_id is required".into()));
        }
        match (&self.vault, self.client_secret.is_empty()) {
            (Some(_), false) => Err(SdkError::Config(
                "auth.client_secret and auth.vault are mutually exclusive".into(),
            )),
            (None, true) => Err(SdkError::Config(
                "auth.client_secret is required unless auth.vault is set".into(),
            )),
            (Some(vault), true) => vault.validate(),
            (None, false) => Ok(()),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_buffer_secs", &self.refresh_buffer_secs)
            .field("scopes", &self.scopes)
            .field("vault", &self.vault)
            .finish()
    }
}

/// Default Vault AppRole login path.
pub const DEFAULT_VAULT_ROLE_PATH: &str = "auth/approle/login";

/// HashiCorp Vault settings for looking up client credentials
///
/// The SDK logs in with AppRole and reads `client_id` and `client_secret`
/// from a KV v2 secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault server address, e.g. `https://vault.example.com:8200`
    pub address: String,
    /// Mount point of the KV v2 engine
    pub kv_mount: String,
    /// Secret path inside the mount
    pub kv_path: String,
    /// Enterprise namespace sent as `X-Vault-Namespace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// AppRole login path
    #[serde(default = "default_vault_role_path")]
    pub role_path: String,
    /// AppRole role id
    pub role_id: String,
    /// AppRole secret id
    #[serde(skip_serializing, default)]
    pub secret_id: String,
}

impl VaultConfig {
    /// AppRole login at the default path, no namespace.
    pub fn new(
        address: impl Into<String>,
        kv_mount: impl Into<String>,
        kv_path: impl Into<String>,
        role_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            kv_mount: kv_mount.into(),
            kv_path: kv_path.into(),
            namespace: None,
            role_path: DEFAULT_VAULT_ROLE_PATH.to_string(),
            role_id: role_id.into(),
            secret_id: secret_id.into(),
        }
    }

    /// # Errors
    /// Returns [`SdkError::Config`] naming the first missing or invalid
    /// field.
    pub fn validate(&self) -> Result<()> {
        validate_url("auth.vault.address", &self.address)?;
        for (field, value) in [
            ("auth.vault.kv_mount", &self.kv_mount),
            ("auth.vault.kv_path", &self.kv_path),
            ("auth.vault.role_path", &self.role_path),
            ("auth.vault.role_id", &self.role_id),
            ("auth.vault.secret_id", &self.secret_id),
        ] {
            if value.trim().is_empty() {
                return Err(SdkError::Config(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("kv_mount", &self.kv_mount)
            .field("kv_path", &self.kv_path)
            .field("namespace", &self.namespace)
            .field("role_path", &self.role_path)
            .field("role_id", &self.role_id)
            .field("secret_id", &"[REDACTED]")
            .finish()
    }
}

/// Transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// Overrides the default `User-Agent`
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl HttpConfig {
    /// Timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS, user_agent: None }
    }
}

/// Token persistence backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenStoreConfig {
    /// Volatile, process local
    #[default]
    Memory,
    /// One JSON file per client id under `base_dir`, fronted by an
    /// in-memory cache
    File {
        /// Directory holding `<client_id>.token.json`
        base_dir: PathBuf,
        /// Upper bound of the random drift (seconds) subtracted from cached
        /// expiries; `0` disables drift
        #[serde(default)]
        drift_secs: u64,
    },
    /// Redis key `nimbus:token:<client_id>`, expiring with the token and
    /// fronted by an in-memory cache
    Redis {
        /// `redis://[user:pass@]host:port/db` or `rediss://...`
        url: String,
        /// Same as for [`TokenStoreConfig::File`]
        #[serde(default)]
        drift_secs: u64,
    },
}

impl TokenStoreConfig {
    /// # Errors
    /// Returns [`SdkError::Config`] for an empty directory or a malformed
    /// Redis URL.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::File { base_dir, .. } => {
                if base_dir.as_os_str().is_empty() {
                    return Err(SdkError::Config("token_store.base_dir is required".into()));
                }
                Ok(())
            }
            Self::Redis { url, .. } => {
                let parsed = Url::parse(url).map_err(|e| {
                    SdkError::Config(format!("token_store.url is not a valid URL: {e}"))
                })?;
                if !matches!(parsed.scheme(), "redis" | "rediss") {
                    return Err(SdkError::Config(format!(
                        "token_store.url has unsupported scheme: {}",
                        parsed.scheme()
                    )));
                }
                if parsed.host_str().map_or(true, str::is_empty) {
                    return Err(SdkError::Config("token_store.url is missing a host".into()));
                }
                Ok(())
            }
        }
    }
}

const fn default_refresh_buffer_secs() -> u64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

fn default_vault_role_path() -> String {
    DEFAULT_VAULT_ROLE_PATH.to_string()
}

const fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SdkError::Config(format!("{field} is required")));
    }
    let parsed =
        Url::parse(value).map_err(|e| SdkError::Config(format!("{field} is not a valid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SdkError::Config(format!("{field} has unsupported scheme: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ClientConfig {
        ClientConfig::new(
            "https://api.example.com",
            AuthConfig::new("https://login.example.com/token", "client", "secret"),
        )
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
        assert_eq!(valid().auth.refresh_buffer(), Duration::from_secs(300));
    }

    #[test]
    fn missing_fields_are_reported() {
        let mut config = valid();
        config.base_url = String::new();
        assert!(matches!(config.validate(), Err(SdkError::Config(m)) if m.contains("base_url")));

        let mut config = valid();
        config.auth.client_secret = String::new();
        assert!(
            matches!(config.validate(), Err(SdkError::Config(m)) if m.contains("client_secret"))
        );

        let mut config = valid();
        config.auth.issuer_url = "ftp://login.example.com".into();
        assert!(matches!(config.validate(), Err(SdkError::Config(m)) if m.contains("scheme")));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", valid().auth);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("secret\""));
    }

    #[test]
    fn vault_replaces_client_secret() {
        let vault = VaultConfig::new("https://vault.example.com:8200", "secret", "nimbus", "role", "sid");
        let mut config = valid();
        config.auth = AuthConfig::with_vault("https://login.example.com/token", "client", vault);
        assert!(config.validate().is_ok());

        config.auth.client_secret = "secret".into();
        assert!(
            matches!(config.validate(), Err(SdkError::Config(m)) if m.contains("mutually exclusive"))
        );

        config.auth.client_secret.clear();
        if let Some(vault) = config.auth.vault.as_mut() {
            vault.role_id.clear();
        }
        assert!(matches!(config.validate(), Err(SdkError::Config(m)) if m.contains("role_id")));
    }

    #[test]
    fn vault_debug_and_serialization_hide_secret_id() {
        let vault = VaultConfig::new("https://vault.example.com", "secret", "nimbus", "role", "s3cr3t-id");
        assert!(!format!("{vault:?}").contains("s3cr3t-id"));
        assert!(!serde_json::to_string(&vault).unwrap().contains("s3cr3t-id"));
    }

    #[test]
    fn redis_store_url_is_checked() {
        let mut config = valid();
        config.token_store =
            TokenStoreConfig::Redis { url: "redis://cache.internal:6379/0".into(), drift_secs: 30 };
        assert!(config.validate().is_ok());

        config.token_store = TokenStoreConfig::Redis { url: "http://cache:6379".into(), drift_secs: 0 };
        assert!(matches!(config.validate(), Err(SdkError::Config(m)) if m.contains("scheme")));

        let parsed: TokenStoreConfig =
            serde_json::from_str(r#"{"kind":"redis","url":"rediss://cache:6380"}"#).unwrap();
        assert_eq!(parsed, TokenStoreConfig::Redis { url: "rediss://cache:6380".into(), drift_secs: 0 });
    }

    #[test]
    fn token_store_config_is_tagged() {
        let store: TokenStoreConfig =
            serde_json::from_str(r#"{"kind":"file","base_dir":"/tmp/nimbus"}"#).unwrap();
        assert_eq!(
            store,
            TokenStoreConfig::File { base_dir: PathBuf::from("/tmp/nimbus"), drift_secs: 0 }
        );
    }
}
