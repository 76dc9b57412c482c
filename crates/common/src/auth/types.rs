//! Token and credential types
//!
//! Defines the bearer token held by the token manager, the wire shape of a
//! client-credentials response, and the credential pair used to request one.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issued bearer token
///
/// Never mutated after issuance; a refresh replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque access token presented as `Authorization: Bearer <token>`
    pub access_token: String,

    /// Token type (always "Bearer" for client credentials)
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Absolute expiration timestamp (UTC); `None` means no expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Create a bearer token expiring `expires_in` from now.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_at: deadline_after(expires_in),
        }
    }

    /// Create a bearer token that never expires.
    #[must_use]
    pub fn non_expiring(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), token_type: default_token_type(), expires_at: None }
    }

    /// A token is valid while it has no expiry or its expiry lies ahead.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && self.expires_at.map_or(true, |at| Utc::now() < at)
    }

    /// Whether the token expires within `buffer` of now (or already has).
    #[must_use]
    pub fn expires_within(&self, buffer: Duration) -> bool {
        match (self.expires_at, deadline_after(buffer)) {
            (Some(expires_at), Some(deadline)) => deadline >= expires_at,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Time left until expiry; zero once expired, `None` without an expiry.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at.map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Copy of this token with its expiry moved `drift` earlier.
    #[must_use]
    pub fn with_drift(&self, drift: Duration) -> Self {
        let mut token = self.clone();
        token.expires_at = self.expires_at.map(|at| {
            chrono::Duration::from_std(drift)
                .ok()
                .and_then(|d| at.checked_sub_signed(d))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        token
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn deadline_after(duration: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(duration).ok().and_then(|d| Utc::now().checked_add_signed(d))
}

/// Client-credentials token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Issued access token
    pub access_token: String,
    /// Usually `"Bearer"`
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Refresh token lifetime, if the issuer reports it
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

impl From<TokenResponse> for Token {
    fn from(response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(chrono::Duration::try_seconds)
            .and_then(|d| Utc::now().checked_add_signed(d));
        Self { access_token: response.access_token, token_type: response.token_type, expires_at }
    }
}

/// Client id and secret for the client-credentials grant
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
}

impl Credentials {
    /// Pair a client id with its secret.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), client_secret: client_secret.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}
