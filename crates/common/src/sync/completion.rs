//! One-shot asynchronous completion handle
//!
//! [`Completion::submit`] runs a unit of work as its own tokio task and
//! returns a handle. Any number of callers may [`Completion::wait`] on the
//! handle; the first one to receive the result caches it and every later
//! wait returns a clone of the cached value without blocking.
//!
//! Cancelling a wait only abandons that wait. The producer task keeps
//! running, and its result is still delivered to the next waiter.

use std::future::Future;

use nimbus_domain::SdkError;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::resilience::{RetryConfig, RetryExecutor};

type Outcome<T> = Result<T, SdkError>;

struct Slot<T> {
    receiver: Option<oneshot::Receiver<Outcome<T>>>,
    cached: Option<Outcome<T>>,
}

/// Handle to a result produced exactly once by a background task
pub struct Completion<T> {
    slot: AsyncMutex<Slot<T>>,
}

impl<T> Completion<T>
where
    T: Clone + Send + 'static,
{
    /// Spawn `work` on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime, like `tokio::spawn`.
    pub fn submit<F>(work: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = work.await;
            if sender.send(outcome).is_err() {
                debug!("completion handle dropped before the result was delivered");
            }
        });
        Self { slot: AsyncMutex::new(Slot { receiver: Some(receiver), cached: None }) }
    }

    /// A handle that is already resolved.
    #[must_use]
    pub fn ready(outcome: Outcome<T>) -> Self {
        Self { slot: AsyncMutex::new(Slot { receiver: None, cached: Some(outcome) }) }
    }

    /// Wait for the result.
    ///
    /// # Errors
    /// - The error produced by the work itself (cached like a value)
    /// - [`SdkError::Cancelled`] if `cancel` fires before the result arrives
    /// - [`SdkError::Internal`] if the producer task panicked
    pub async fn wait(&self, cancel: &CancellationToken) -> Outcome<T> {
        let mut slot = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SdkError::Cancelled),
            slot = self.slot.lock() => slot,
        };

        if let Some(outcome) = &slot.cached {
            return outcome.clone();
        }

        let Some(receiver) = slot.receiver.as_mut() else {
            return Err(SdkError::Internal("completion has neither result nor producer".into()));
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SdkError::Cancelled),
            received = receiver => received.unwrap_or_else(|_| {
                Err(SdkError::Internal("producer task ended without a result".into()))
            }),
        };

        slot.receiver = None;
        slot.cached = Some(outcome.clone());
        outcome
    }

    /// The result if it is already available, without waiting.
    pub async fn try_result(&self) -> Option<Outcome<T>> {
        let mut slot = self.slot.lock().await;
        if slot.cached.is_none() {
            let received = slot.receiver.as_mut().and_then(|rx| match rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    Some(Err(SdkError::Internal("producer task ended without a result".into())))
                }
            });
            if received.is_some() {
                slot.receiver = None;
                slot.cached = received;
            }
        }
        slot.cached.clone()
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// Run `call` in the background, retrying failures with the configured
/// backoff.
///
/// After the last failed attempt the handle resolves to
/// [`SdkError::RetriesExhausted`], whose message reads
/// `after N retries: <cause>`. `cancel` stops the retry loop itself between
/// (or during) attempts.
pub fn call_with_retry<F, Fut, T>(
    cancel: CancellationToken,
    config: RetryConfig,
    call: F,
) -> Completion<T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
    T: Clone + Send + 'static,
{
    wait_for(cancel, config, call, |_: &T| true)
}

/// Like [`call_with_retry`], but a successful value only resolves the
/// handle once `check` accepts it.
///
/// Used to wait for eventually consistent reads ("until the listing contains
/// the new key"). Values rejected by `check` are retried like failures.
pub fn wait_for<F, Fut, T, C>(
    cancel: CancellationToken,
    config: RetryConfig,
    call: F,
    check: C,
) -> Completion<T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
    T: Clone + Send + 'static,
    C: Fn(&T) -> bool + Send + 'static,
{
    Completion::submit(async move {
        RetryExecutor::new(config).execute_until(&cancel, call, check).await
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;

    fn quick(attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(attempts)
            .fixed_backoff(Duration::from_millis(5))
            .no_jitter()
            .build()
            .unwrap()
    }

    /// Validates that repeated waits return the cached result and the work
    /// runs once.
    #[tokio::test]
    async fn test_wait_is_idempotent() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let completion = Completion::submit(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, SdkError>("done".to_string())
        });
        let cancel = CancellationToken::new();

        let first = completion.wait(&cancel).await.unwrap();
        let second = completion.wait(&cancel).await.unwrap();

        assert_eq!(first, "done");
        assert_eq!(first, second);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    /// Validates that errors are cached like values.
    #[tokio::test]
    async fn test_error_is_cached() {
        let completion: Completion<u32> =
            Completion::submit(async { Err(SdkError::transport("refused")) });
        let cancel = CancellationToken::new();

        let first = completion.wait(&cancel).await.unwrap_err();
        let second = completion.wait(&cancel).await.unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }

    /// Validates that a cancelled wait returns promptly and leaves the
    /// producer running.
    ///
    /// Assertions:
    /// - Ensures the cancelled wait returns `Cancelled` well before the work
    ///   finishes.
    /// - Confirms a later wait still receives the result.
    #[tokio::test]
    async fn test_cancelled_wait_leaves_producer_running() {
        let completion = Completion::submit(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, SdkError>(7_u32)
        });

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(completion.wait(&cancel).await.unwrap_err().is_cancelled());
        assert!(started.elapsed() < Duration::from_millis(150));

        assert_eq!(completion.wait(&CancellationToken::new()).await.unwrap(), 7);
    }

    /// Validates that a panicking producer surfaces as an internal error.
    #[tokio::test]
    async fn test_panicking_producer() {
        let completion: Completion<u32> = Completion::submit(async { panic!("boom") });
        let err = completion.wait(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SdkError::Internal(_)));
    }

    /// Validates pre-resolved handles and non-blocking reads.
    #[tokio::test]
    async fn test_ready_and_try_result() {
        let ready = Completion::ready(Ok(1_u8));
        assert_eq!(ready.try_result().await.unwrap().unwrap(), 1);

        let pending = Completion::submit(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, SdkError>(2_u8)
        });
        assert!(pending.try_result().await.is_none());
        assert_eq!(pending.wait(&CancellationToken::new()).await.unwrap(), 2);
        assert_eq!(pending.try_result().await.unwrap().unwrap(), 2);
    }

    /// Validates retry exhaustion through the background helper.
    #[tokio::test]
    async fn test_call_with_retry_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let completion = call_with_retry(CancellationToken::new(), quick(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SdkError::transport("connection refused")) }
        });

        let err = completion.wait(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "after 2 retries: Transport error: connection refused");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    /// Validates that `wait_for` keeps calling until the check passes.
    #[tokio::test]
    async fn test_wait_for_check() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let completion = wait_for(
            CancellationToken::new(),
            quick(5),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, SdkError>(n) }
            },
            |n| *n >= 3,
        );

        assert_eq!(completion.wait(&CancellationToken::new()).await.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
