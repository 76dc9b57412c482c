//! Runtime core shared by the Nimbus SDK crates.
//!
//! # Modules
//!
//! - `auth`: OAuth2 client-credentials issuance, token stores and the
//!   [`TokenManager`] that keeps a bearer token fresh
//! - `resilience`: retry with backoff, jitter and an overall deadline
//! - `sync`: [`Completion`], a cached one-shot result of background work
//! - `polling`: [`StatePoller`], which waits for a resource to settle
//! - `testing`: mocks for the seams above (`test-utils` feature)
//!
//! HTTP execution lives in `nimbus-infra`; plain data and the error type
//! live in `nimbus-domain`.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod polling;
pub mod resilience;
pub mod sync;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use auth::{
    CachedTokenStore, Credentials, CredentialsProvider, FileTokenStore, KeyValueCache,
    MemoryTokenStore, OAuthTokenIssuer, RedisCache, RemoteCacheTokenStore, StaticCredentials,
    Token, TokenIssuer, TokenManager, TokenStore, VaultCredentialsProvider,
};
pub use polling::{wait_for_state, PollOutcome, StatePoller};
pub use resilience::{BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryExecutor};
pub use sync::{call_with_retry, wait_for, Completion};
