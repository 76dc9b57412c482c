//! HashiCorp Vault credentials provider
//!
//! Logs in with AppRole, reads `client_id` and `client_secret` from a KV v2
//! secret and keeps the Vault token alive:
//!
//! - the first lookup performs the AppRole login
//! - renewable tokens are renewed once half of their lease has passed
//! - a failed renewal, an expired lease or a 401/403 on the secret read
//!   falls back to a fresh login

use std::time::{Duration, Instant};

use async_trait::async_trait;
use nimbus_domain::{SdkError, VaultConfig};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::client::DEFAULT_ISSUER_TIMEOUT;
use super::traits::CredentialsProvider;
use super::types::Credentials;

/// Renewal interval used when Vault reports no lease duration.
const FALLBACK_RENEW_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    auth: Option<AuthBlock>,
}

#[derive(Debug, Deserialize)]
struct AuthBlock {
    #[serde(default)]
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Debug, Deserialize)]
struct KvEnvelope {
    data: KvData,
}

#[derive(Debug, Deserialize)]
struct KvData {
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct VaultErrors {
    #[serde(default)]
    errors: Vec<String>,
}

struct Session {
    client_token: String,
    renewable: bool,
    lease: Duration,
    expires_at: Option<Instant>,
    renew_after: Instant,
}

impl Session {
    fn from_auth(auth: AuthBlock) -> Self {
        let now = Instant::now();
        let lease = Duration::from_secs(auth.lease_duration);
        let half = if lease.is_zero() { FALLBACK_RENEW_INTERVAL } else { lease / 2 };
        Self {
            client_token: auth.client_token,
            renewable: auth.renewable,
            lease,
            expires_at: (!lease.is_zero()).then(|| now + lease),
            renew_after: now + half,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    fn wants_renewal(&self) -> bool {
        self.renewable && Instant::now() >= self.renew_after
    }
}

/// [`CredentialsProvider`] reading the client credentials from Vault
pub struct VaultCredentialsProvider {
    client: reqwest::Client,
    config: VaultConfig,
    session: AsyncMutex<Option<Session>>,
}

impl VaultCredentialsProvider {
    /// Create a provider with its own HTTP client.
    ///
    /// # Errors
    /// Returns [`SdkError::Config`] if the HTTP client cannot be built.
    pub fn new(config: VaultConfig) -> Result<Self, SdkError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_ISSUER_TIMEOUT)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build Vault HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a provider sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: VaultConfig) -> Self {
        Self { client, config, session: AsyncMutex::new(None) }
    }

    /// Vault settings in use
    #[must_use]
    pub const fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/v1/{}",
            self.config.address.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let builder = self.client.request(method, url);
        match self.config.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(namespace) => builder.header("X-Vault-Namespace", namespace),
            None => builder,
        }
    }

    /// A usable Vault token, logging in or renewing as needed.
    async fn session_token(&self) -> Result<String, SdkError> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.take() {
            if current.is_expired() {
                debug!("vault token lease expired, logging in again");
            } else if current.wants_renewal() {
                match self.renew(&current).await {
                    Ok(renewed) => {
                        let token = renewed.client_token.clone();
                        *session = Some(renewed);
                        return Ok(token);
                    }
                    Err(e) => warn!(error = %e, "vault token renewal failed, logging in again"),
                }
            } else {
                let token = current.client_token.clone();
                *session = Some(current);
                return Ok(token);
            }
        }

        let fresh = self.login().await?;
        let token = fresh.client_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    async fn login(&self) -> Result<Session, SdkError> {
        let response = self
            .request(Method::POST, &self.config.role_path)
            .json(&json!({ "role_id": self.config.role_id, "secret_id": self.config.secret_id }))
            .send()
            .await
            .map_err(|e| SdkError::auth(format!("vault unreachable: {e}")))?;

        let envelope: AuthEnvelope = read_json(response, "vault approle login").await?;
        let auth = envelope
            .auth
            .filter(|auth| !auth.client_token.is_empty())
            .ok_or_else(|| SdkError::auth("vault approle login response is missing a client token"))?;
        let session = Session::from_auth(auth);
        info!(
            lease_secs = session.lease.as_secs(),
            renewable = session.renewable,
            "vault approle login succeeded"
        );
        Ok(session)
    }

    async fn renew(&self, current: &Session) -> Result<Session, SdkError> {
        let response = self
            .request(Method::POST, "auth/token/renew-self")
            .header("X-Vault-Token", &current.client_token)
            .json(&json!({ "increment": format!("{}s", current.lease.as_secs()) }))
            .send()
            .await
            .map_err(|e| SdkError::auth(format!("vault unreachable: {e}")))?;

        let envelope: AuthEnvelope = read_json(response, "vault token renewal").await?;
        let mut auth = envelope
            .auth
            .ok_or_else(|| SdkError::auth("vault token renewal response has no auth block"))?;
        if auth.client_token.is_empty() {
            auth.client_token.clone_from(&current.client_token);
        }
        debug!(lease_secs = auth.lease_duration, "vault token renewed");
        Ok(Session::from_auth(auth))
    }

    async fn read_secret(&self, token: &str) -> Result<Credentials, SdkError> {
        let path = format!(
            "{}/data/{}",
            self.config.kv_mount.trim_matches('/'),
            self.config.kv_path.trim_start_matches('/')
        );
        let response = self
            .request(Method::GET, &path)
            .header("X-Vault-Token", token)
            .send()
            .await
            .map_err(|e| SdkError::auth(format!("vault unreachable: {e}")))?;

        let envelope: KvEnvelope = read_json(response, "vault secret read").await?;
        credentials_from_secret(&envelope.data.data)
    }
}

#[async_trait]
impl CredentialsProvider for VaultCredentialsProvider {
    async fn fetch_credentials(&self) -> Result<Credentials, SdkError> {
        let token = self.session_token().await?;
        match self.read_secret(&token).await {
            Err(SdkError::Auth { status: Some(401 | 403), .. }) => {
                warn!("vault rejected the session token, logging in again");
                self.session.lock().await.take();
                let token = self.session_token().await?;
                self.read_secret(&token).await
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for VaultCredentialsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCredentialsProvider").field("config", &self.config).finish_non_exhaustive()
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, SdkError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SdkError::auth(format!("{context}: failed to read response: {e}")))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<VaultErrors>(&body)
            .ok()
            .filter(|e| !e.errors.is_empty())
            .map_or_else(|| body.clone(), |e| e.errors.join("; "));
        warn!(status = status.as_u16(), context, "vault request rejected");
        return Err(SdkError::Auth {
            message: format!("{context} failed with status {status}: {detail}"),
            status: Some(status.as_u16()),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| SdkError::auth(format!("{context}: malformed response: {e}")))
}

fn credentials_from_secret(
    data: &serde_json::Map<String, serde_json::Value>,
) -> Result<Credentials, SdkError> {
    let field = |key: &str| {
        data.get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SdkError::auth(format!("vault secret does not contain {key}")))
    };
    Ok(Credentials::new(field("client_id")?, field("client_secret")?))
}
