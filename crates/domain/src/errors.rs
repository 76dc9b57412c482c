//! Error types used throughout the SDK runtime

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Stage of an HTTP round trip at which a transport failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Name resolution or connection establishment
    Connect,
    /// The per-request timeout elapsed
    Timeout,
    /// The response body could not be read
    Body,
    /// The redirect policy was violated
    Redirect,
    /// Anything else reported by the HTTP stack
    Other,
}

/// Main error type for the Nimbus runtime
///
/// Every variant is `Clone` so a completed asynchronous result can be cached
/// and handed out to any number of waiters. Nested causes are shared through
/// `Arc`.
#[derive(Error, Debug, Clone)]
pub enum SdkError {
    /// Token issuance or refresh failed
    #[error("Authentication error: {message}")]
    Auth {
        /// Human readable cause
        message: String,
        /// HTTP status returned by the issuer, when one was received
        status: Option<u16>,
    },

    /// The request could not be prepared (URL, headers, interceptor chain)
    #[error("Request preparation failed: {message}")]
    Preparation {
        /// Human readable cause
        message: String,
        /// Underlying error raised by an interceptor, if any
        #[source]
        source: Option<Arc<SdkError>>,
    },

    /// Network level failure (DNS, connect, timeout, body read)
    #[error("Transport error: {message}")]
    Transport {
        /// Stage of the round trip that failed
        kind: TransportKind,
        /// Human readable cause
        message: String,
        /// Error raised by the HTTP stack
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// The API answered with an error status
    #[error("API returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Problem detail, title or raw body
        message: String,
    },

    /// A success response carried a body that could not be decoded
    #[error("Failed to decode response body (status {status}): {message}")]
    Decode {
        /// HTTP status of the response
        status: u16,
        /// Decoder error message
        message: String,
        /// Raw response body for diagnostics
        raw_body: Arc<[u8]>,
    },

    /// A polled resource reached a configured failure state
    #[error("{kind} {id} reached failure state: {state}")]
    ResourceFailed {
        /// Resource kind, e.g. `"vpc"`
        kind: String,
        /// Resource identifier
        id: String,
        /// The failure state label that was observed
        state: String,
    },

    /// Polling exhausted its attempt budget
    #[error(
        "timeout waiting for {kind} {id} after {attempts} attempts (last state: {})",
        .last_state.as_deref().unwrap_or("unknown")
    )]
    PollTimeout {
        /// Resource kind
        kind: String,
        /// Resource identifier
        id: String,
        /// Number of accessor calls performed
        attempts: u32,
        /// Last state label observed, if any call succeeded
        last_state: Option<String>,
    },

    /// A retried call kept succeeding without satisfying its check
    #[error("condition not met")]
    ConditionNotMet,

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// An overall deadline elapsed
    #[error(
        "Operation timed out after {elapsed:?} and {attempts} attempts{}",
        .source.as_ref().map(|e| format!(": {e}")).unwrap_or_default()
    )]
    Timeout {
        /// Time spent before giving up
        elapsed: Duration,
        /// Attempts completed before the deadline
        attempts: u32,
        /// Failure of the last completed attempt, if any
        #[source]
        source: Option<Arc<SdkError>>,
    },

    /// A retried operation failed on every attempt
    #[error("after {attempts} retries: {source}")]
    RetriesExhausted {
        /// Number of attempts performed
        attempts: u32,
        /// Error from the final attempt
        #[source]
        source: Arc<SdkError>,
    },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token persistence failure
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Invariant violation or lost task
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// Build an [`SdkError::Auth`] without an HTTP status.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into(), status: None }
    }

    /// Build an [`SdkError::Transport`] of kind [`TransportKind::Other`]
    /// without an underlying cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { kind: TransportKind::Other, message: message.into(), source: None }
    }

    /// The failing stage, for transport errors.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Build an [`SdkError::Preparation`] without an underlying cause.
    pub fn preparation(message: impl Into<String>) -> Self {
        Self::Preparation { message: message.into(), source: None }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Transport failures and deadlines are transient. Authentication,
    /// decoding, preparation and terminal resource states are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::PollTimeout { .. }
            | Self::ConditionNotMet => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::RetriesExhausted { source, .. } => source.is_retryable(),
            Self::Auth { .. }
            | Self::Preparation { .. }
            | Self::Decode { .. }
            | Self::ResourceFailed { .. }
            | Self::Cancelled
            | Self::Config(_)
            | Self::Storage(_)
            | Self::Internal(_) => false,
        }
    }

    /// Returns `true` for [`SdkError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for Nimbus operations
pub type Result<T> = std::result::Result<T, SdkError>;
