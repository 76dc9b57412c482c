//! OAuth2 client-credentials token issuer
//!
//! Exchanges a client id and secret for a bearer token at the configured
//! token endpoint. Used by the token manager for the initial issuance and
//! every refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimbus_domain::SdkError;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};

use super::traits::{CredentialsProvider, TokenIssuer};
use super::types::{Token, TokenResponse};

/// Default timeout for token endpoint calls.
pub const DEFAULT_ISSUER_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth error response body (RFC 6749 section 5.2)
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// reqwest-backed [`TokenIssuer`] for the client-credentials grant
pub struct OAuthTokenIssuer {
    client: reqwest::Client,
    issuer_url: String,
    credentials: Arc<dyn CredentialsProvider>,
    scopes: Vec<String>,
}

impl OAuthTokenIssuer {
    /// Create an issuer with its own HTTP client.
    ///
    /// # Errors
    /// Returns [`SdkError::Config`] if the HTTP client cannot be built.
    pub fn new(
        issuer_url: impl Into<String>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, SdkError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_ISSUER_TIMEOUT)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build token HTTP client: {e}")))?;
        Ok(Self::with_client(client, issuer_url, credentials))
    }

    /// Create an issuer sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        issuer_url: impl Into<String>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        Self { client, issuer_url: issuer_url.into(), credentials, scopes: Vec::new() }
    }

    /// Request these scopes with every grant.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Token endpoint URL
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }
}

#[async_trait]
impl TokenIssuer for OAuthTokenIssuer {
    async fn request_token(&self) -> Result<Token, SdkError> {
        let credentials = self.credentials.fetch_credentials().await?;

        let mut params = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
        ];
        if !self.scopes.is_empty() {
            params.push(("scope", self.scopes.join(" ")));
        }

        debug!(issuer = %self.issuer_url, client_id = %credentials.client_id, "requesting token");

        let response = self
            .client
            .post(&self.issuer_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| SdkError::auth(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SdkError::auth(format!("failed to read token response: {e}")))?;

        if !status.is_success() {
            let message = match status.as_u16() {
                401 => "authentication failed: invalid client credentials".to_string(),
                403 => "insufficient privileges for client credentials grant".to_string(),
                _ => match serde_json::from_str::<OAuthErrorBody>(&body) {
                    Ok(err) => match err.error_description {
                        Some(desc) => format!("token request rejected: {}: {desc}", err.error),
                        None => format!("token request rejected: {}", err.error),
                    },
                    Err(_) => format!("token request failed with status {status}: {body}"),
                },
            };
            warn!(status = status.as_u16(), "token request rejected");
            return Err(SdkError::Auth { message, status: Some(status.as_u16()) });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| SdkError::auth(format!("malformed token response: {e}")))?;

        if parsed.access_token.is_empty() {
            return Err(SdkError::auth("token response did not contain an access token"));
        }

        debug!(expires_in = ?parsed.expires_in, "token issued");

        Ok(parsed.into())
    }
}
