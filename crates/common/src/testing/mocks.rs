//! Mock implementations of the runtime seams
//!
//! - [`MockTokenIssuer`] stands in for the OAuth2 endpoint.
//! - [`StateSequence`] scripts the answers of a state accessor for the
//!   poller.

// Test mocks report failures through their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimbus_domain::SdkError;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::{Token, TokenIssuer};

/// Token issuer that hands out `token-1`, `token-2`, ... with a configurable
/// lifetime.
#[derive(Debug)]
pub struct MockTokenIssuer {
    lifetime: Mutex<Duration>,
    delay: Option<Duration>,
    failure: Mutex<Option<SdkError>>,
    calls: AtomicUsize,
    issued: AtomicUsize,
}

impl MockTokenIssuer {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime: Mutex::new(lifetime),
            delay: None,
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
        }
    }

    /// Sleep for `delay` inside every request, to widen race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Lifetime of tokens issued from now on.
    pub fn set_lifetime(&self, lifetime: Duration) {
        *self.lifetime.lock() = lifetime;
    }

    /// Fail every following request with `error`, or succeed again on `None`.
    pub fn fail_with(&self, error: Option<SdkError>) {
        *self.failure.lock() = error;
    }

    /// Number of `request_token` calls, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for MockTokenIssuer {
    async fn request_token(&self) -> Result<Token, SdkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Token::bearer(format!("token-{n}"), *self.lifetime.lock()))
    }
}

/// Scripted answers for a state accessor.
///
/// Each call consumes the next entry; the last entry repeats forever.
#[derive(Debug, Clone)]
pub struct StateSequence {
    script: Arc<Mutex<VecDeque<Result<String, SdkError>>>>,
    calls: Arc<AtomicUsize>,
}

impl StateSequence {
    /// Accessor that reports `states` in order.
    pub fn new<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(states.into_iter().map(|s| Ok(s.into())).collect())
    }

    /// Accessor that reports states or errors in order.
    pub fn scripted(script: Vec<Result<String, SdkError>>) -> Self {
        Self { script: Arc::new(Mutex::new(script.into())), calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Closure suitable for the poller's accessor argument.
    pub fn accessor(
        &self,
    ) -> impl FnMut(CancellationToken) -> Ready<Result<String, SdkError>> + Send + 'static {
        let this = self.clone();
        move |_cancel| ready(this.next())
    }

    fn next(&self) -> Result<String, SdkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or_else(|| Err(SdkError::Internal("empty script".into())))
        } else {
            script.front().cloned().unwrap_or_else(|| Err(SdkError::Internal("empty script".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issuer_numbers_tokens_and_fails_on_demand() {
        let issuer = MockTokenIssuer::new(Duration::from_secs(60));
        assert_eq!(issuer.request_token().await.unwrap().access_token, "token-1");

        issuer.fail_with(Some(SdkError::auth("nope")));
        assert!(issuer.request_token().await.is_err());

        issuer.fail_with(None);
        assert_eq!(issuer.request_token().await.unwrap().access_token, "token-2");
        assert_eq!(issuer.call_count(), 3);
    }

    #[tokio::test]
    async fn sequence_repeats_last_entry() {
        let sequence = StateSequence::new(["Creating", "Active"]);
        let mut accessor = sequence.accessor();
        let token = CancellationToken::new();

        let mut answers = Vec::new();
        for _ in 0..4 {
            answers.push(accessor(token.clone()).await.unwrap());
        }
        assert_eq!(answers, ["Creating", "Active", "Active", "Active"]);
        assert_eq!(sequence.calls(), 4);
    }
}
