//! Resilience patterns for transient failures
//!
//! Provides the runtime's canonical retry policy: bounded exponential
//! backoff with jitter, capped by an overall deadline and interruptible by a
//! [`tokio_util::sync::CancellationToken`].
//!
//! Higher level helpers that wrap this executor in an awaitable handle live
//! in [`crate::sync`].

pub mod retry;

// Re-export retry types
pub use retry::{BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryExecutor};
