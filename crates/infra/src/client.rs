//! Composition root of the SDK
//!
//! [`CloudClient`] wires the token manager, the interceptor chain and the
//! [`RestClient`] together from a [`ClientConfig`]. Construct it once and
//! pass it by reference to everything that talks to the API.

use std::future::Future;
use std::sync::Arc;

use nimbus_common::auth::{
    CachedTokenStore, Credentials, CredentialsProvider, FileTokenStore, MemoryTokenStore,
    OAuthTokenIssuer, RedisCache, RemoteCacheTokenStore, StaticCredentials, TokenIssuer,
    TokenManager, TokenStore, VaultCredentialsProvider,
};
use nimbus_common::polling::{self, PollOutcome};
use nimbus_domain::{ClientConfig, PollingConfig, RequestDescriptor, Response, SdkError, TokenStoreConfig};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::http::{
    AcceptJson, BearerAuth, Interceptor, InterceptorChain, RestClient, StaticHeaders, UserAgent,
};

/// Authenticated client for the cloud REST API.
#[derive(Debug)]
pub struct CloudClient {
    config: ClientConfig,
    tokens: Arc<TokenManager>,
    rest: RestClient,
}

impl CloudClient {
    /// Validate `config`, obtain the first token and build the pipeline.
    ///
    /// # Errors
    /// - [`SdkError::Config`] for an invalid configuration
    /// - [`SdkError::Auth`] if no initial token can be obtained
    /// - [`SdkError::Cancelled`] if `cancel` fires first
    pub async fn connect(config: ClientConfig, cancel: &CancellationToken) -> Result<Self, SdkError> {
        Self::builder(config).connect(cancel).await
    }

    /// Builder for overriding the issuer, the token store, the HTTP client
    /// or adding interceptors.
    pub fn builder(config: ClientConfig) -> CloudClientBuilder {
        CloudClientBuilder::new(config)
    }

    /// Execute one authenticated round trip.
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn execute<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        descriptor: RequestDescriptor,
    ) -> Result<Response<T>, SdkError> {
        self.rest.execute(cancel, descriptor).await
    }

    /// A bearer token valid for at least the refresh buffer.
    ///
    /// # Errors
    /// See [`TokenManager::get_token`].
    pub async fn get_token(&self, cancel: &CancellationToken) -> Result<String, SdkError> {
        self.tokens.get_token(cancel).await
    }

    /// Poll `accessor` until the resource reaches a success state.
    ///
    /// # Errors
    /// See [`nimbus_common::polling::StatePoller::wait_for_state`].
    pub async fn wait_for_state<F, Fut>(
        &self,
        cancel: &CancellationToken,
        kind: &str,
        id: &str,
        accessor: F,
        config: PollingConfig,
    ) -> Result<PollOutcome, SdkError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<String, SdkError>>,
    {
        polling::wait_for_state(cancel, kind, id, accessor, config).await
    }

    /// The authenticated request pipeline.
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Token manager shared with the bearer interceptor.
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Configuration the client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Builder for [`CloudClient`].
pub struct CloudClientBuilder {
    config: ClientConfig,
    issuer: Option<Arc<dyn TokenIssuer>>,
    store: Option<Arc<dyn TokenStore>>,
    http_client: Option<reqwest::Client>,
    extra: Vec<Arc<dyn Interceptor>>,
}

impl CloudClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self { config, issuer: None, store: None, http_client: None, extra: Vec::new() }
    }

    /// Replace the OAuth2 issuer built from `auth`.
    pub fn token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Replace the store selected by `token_store`, e.g. with a
    /// `RemoteCacheTokenStore`.
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// HTTP client shared by the issuer and the pipeline.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Append an interceptor after the built-in ones.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.extra.push(Arc::new(interceptor));
        self
    }

    /// Build the client, failing fast when no token can be obtained.
    ///
    /// # Errors
    /// See [`CloudClient::connect`].
    #[instrument(skip_all, fields(base_url = %self.config.base_url))]
    pub async fn connect(self, cancel: &CancellationToken) -> Result<CloudClient, SdkError> {
        let config = self.config;
        config.validate()?;

        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(config.http.timeout())
                .build()
                .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {e}")))?,
        };

        let issuer: Arc<dyn TokenIssuer> = match self.issuer {
            Some(issuer) => issuer,
            None => {
                let credentials: Arc<dyn CredentialsProvider> = match &config.auth.vault {
                    Some(vault) => {
                        Arc::new(VaultCredentialsProvider::with_client(http.clone(), vault.clone()))
                    }
                    None => Arc::new(StaticCredentials::new(Credentials::new(
                        config.auth.client_id.clone(),
                        config.auth.client_secret.clone(),
                    ))),
                };
                Arc::new(
                    OAuthTokenIssuer::with_client(
                        http.clone(),
                        config.auth.issuer_url.clone(),
                        credentials,
                    )
                    .with_scopes(config.auth.scopes.clone()),
                )
            }
        };
        let store = match self.store {
            Some(store) => store,
            None => build_token_store(&config.token_store, &config.auth.client_id)?,
        };

        let tokens = Arc::new(TokenManager::new(issuer, store, config.auth.refresh_buffer()));
        tokens.get_token(cancel).await?;

        let user_agent = match &config.http.user_agent {
            Some(agent) => UserAgent::new(agent)?,
            None => UserAgent::default(),
        };
        let mut chain = InterceptorChain::new()
            .with(BearerAuth::new(Arc::clone(&tokens)))
            .with(StaticHeaders::from_map(&config.headers)?)
            .with(user_agent)
            .with(AcceptJson);
        for interceptor in self.extra {
            chain.push(interceptor);
        }

        let rest = RestClient::builder(config.base_url.clone())
            .http_client(http)
            .interceptors(chain)
            .build()?;

        info!(
            interceptors = rest.interceptors().len(),
            token_generation = tokens.generation(),
            "cloud client connected"
        );

        Ok(CloudClient { config, tokens, rest })
    }
}

impl std::fmt::Debug for CloudClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClientBuilder")
            .field("config", &self.config)
            .field("custom_issuer", &self.issuer.is_some())
            .field("custom_store", &self.store.is_some())
            .field("extra_interceptors", &self.extra.len())
            .finish_non_exhaustive()
    }
}

/// Token store described by `config`.
///
/// Persistent backends are fronted by a [`CachedTokenStore`].
///
/// # Errors
/// Returns [`SdkError::Config`] for an unusable Redis URL.
pub fn build_token_store(
    config: &TokenStoreConfig,
    client_id: &str,
) -> Result<Arc<dyn TokenStore>, SdkError> {
    let (backend, drift_secs) = match config {
        TokenStoreConfig::Memory => return Ok(Arc::new(MemoryTokenStore::new())),
        TokenStoreConfig::File { base_dir, drift_secs } => {
            let file: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(base_dir, client_id));
            (file, *drift_secs)
        }
        TokenStoreConfig::Redis { url, drift_secs } => {
            let cache = RedisCache::open(url)?;
            let redis: Arc<dyn TokenStore> = Arc::new(RemoteCacheTokenStore::new(cache, client_id));
            (redis, *drift_secs)
        }
    };
    Ok(Arc::new(CachedTokenStore::new(backend).with_max_drift(drift_secs)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use nimbus_common::auth::Token;
    use nimbus_common::testing::MockTokenIssuer;
    use nimbus_domain::AuthConfig;

    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new(
            "https://api.example.com/v1",
            AuthConfig::new("https://login.example.com/token", "client", "secret"),
        )
    }

    #[tokio::test]
    async fn connect_obtains_initial_token() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
        let client = CloudClient::builder(config())
            .token_issuer(issuer.clone())
            .connect(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(issuer.call_count(), 1);
        assert_eq!(client.get_token(&CancellationToken::new()).await.unwrap(), "token-1");
        assert_eq!(
            client.rest().interceptors().names(),
            vec!["bearer_auth", "static_headers", "user_agent", "accept_json"]
        );
    }

    #[tokio::test]
    async fn connect_fails_fast_without_token() {
        let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
        issuer.fail_with(Some(SdkError::auth("invalid_client")));

        let err = CloudClient::builder(config())
            .token_issuer(issuer)
            .connect(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Auth { .. }));
    }

    #[tokio::test]
    async fn connect_rejects_invalid_config() {
        let mut bad = config();
        bad.auth.client_secret.clear();
        let err = CloudClient::connect(bad, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[tokio::test]
    async fn file_store_config_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_token_store(
            &TokenStoreConfig::File { base_dir: dir.path().to_path_buf(), drift_secs: 0 },
            "client",
        )
        .unwrap();
        store.save_token(&Token::bearer("persisted", Duration::from_secs(3600))).await.unwrap();

        assert!(dir.path().join("client.token.json").exists());
        assert_eq!(store.fetch_token().await.unwrap().unwrap().access_token, "persisted");
    }

    #[test]
    fn redis_store_config_builds_without_connecting() {
        let store = build_token_store(
            &TokenStoreConfig::Redis { url: "redis://127.0.0.1:6379/0".into(), drift_secs: 10 },
            "client",
        );
        assert!(store.is_ok());

        let err = build_token_store(
            &TokenStoreConfig::Redis { url: "redis//missing-colon".into(), drift_secs: 0 },
            "client",
        )
        .err()
        .unwrap();
        assert!(matches!(err, SdkError::Config(_)));
    }
}
