//! Retry with bounded exponential backoff, jitter and an overall deadline
//!
//! This is the single retry policy of the runtime. Both the plain retry
//! helper and the condition-checking variant in [`crate::sync`] run on
//! [`RetryExecutor`]; the state poller deliberately does not (it polls on a
//! fixed interval).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nimbus_domain::SdkError;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: `initial_delay * base^attempt`, capped at
    /// `max_delay`
    Exponential {
        /// Delay after the first failure
        initial_delay: Duration,
        /// Growth factor
        base: f64,
        /// Upper bound for any single delay
        max_delay: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate the delay after the failed attempt `attempt` (0-based)
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = initial_delay.as_millis() as f64 * base.powi(exponent);
                if !delay.is_finite() || delay >= max_delay.as_millis() as f64 {
                    *max_delay
                } else {
                    Duration::from_millis(delay.max(0.0) as u64)
                }
            }
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: 0 to calculated delay
    Full,
    /// Equal jitter: calculated delay / 2 to calculated delay
    Equal,
}

impl Jitter {
    /// Apply jitter to the calculated delay
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(random_up_to(millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + random_up_to(millis - half))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
    /// Maximum total time to spend retrying
    pub max_total_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(500),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Equal,
            max_total_time: Some(Duration::from_secs(300)), // 5 minutes
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`SdkError::Config`] for a zero attempt budget or a
    /// non-positive exponential base.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.max_attempts == 0 {
            return Err(SdkError::Config("max_attempts must be greater than 0".to_string()));
        }

        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if *base <= 0.0 => {
                return Err(SdkError::Config("exponential base must be greater than 0".to_string()));
            }
            _ => {}
        }

        Ok(())
    }
}

/// Builder for [`RetryConfig`] with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Start from [`RetryConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    /// Total number of attempts.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Same delay between every attempt.
    #[must_use]
    pub const fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    /// Exponential growth from `initial_delay`, capped at `max_delay`.
    #[must_use]
    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    /// Use full jitter.
    #[must_use]
    pub const fn full_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Full;
        self
    }

    /// Use equal jitter.
    #[must_use]
    pub const fn equal_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Equal;
        self
    }

    /// Overall deadline across all attempts and delays.
    #[must_use]
    pub const fn max_total_time(mut self, duration: Duration) -> Self {
        self.config.max_total_time = Some(duration);
        self
    }

    /// No overall deadline.
    #[must_use]
    pub const fn unlimited_time(mut self) -> Self {
        self.config.max_total_time = None;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    /// See [`RetryConfig::validate`].
    pub fn build(self) -> Result<RetryConfig, SdkError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

type RetryPredicate = Arc<dyn Fn(&SdkError) -> bool + Send + Sync>;

/// The main retry executor
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    retry_if: Option<RetryPredicate>,
}

impl RetryExecutor {
    /// Create a new retry executor with the given configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config, retry_if: None }
    }

    /// Only retry errors for which `predicate` returns `true`; any other
    /// error is returned immediately, unwrapped.
    #[must_use]
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&SdkError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    ///
    /// # Errors
    /// - [`SdkError::RetriesExhausted`] wrapping the last failure once every
    ///   attempt failed
    /// - [`SdkError::Timeout`] once the overall deadline passed
    /// - [`SdkError::Cancelled`] when `cancel` fires
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> Result<T, SdkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SdkError>>,
    {
        self.execute_until(cancel, operation, |_| true).await
    }

    /// Execute until the operation succeeds with a value accepted by
    /// `check`.
    ///
    /// A successful value rejected by `check` counts as a failed attempt
    /// with cause [`SdkError::ConditionNotMet`].
    ///
    /// # Errors
    /// Same as [`RetryExecutor::execute`].
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn execute_until<F, Fut, T, C>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
        check: C,
    ) -> Result<T, SdkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SdkError>>,
        C: Fn(&T) -> bool,
    {
        self.config.validate()?;

        let started = Instant::now();
        let max_attempts = self.config.max_attempts;
        let mut last_error = SdkError::ConditionNotMet;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(SdkError::Cancelled);
            }
            if let Some(elapsed) = self.deadline_passed(started) {
                warn!(?elapsed, attempts = attempt, error = %last_error, "retry deadline exceeded");
                let source = (attempt > 0).then(|| Arc::new(last_error));
                return Err(SdkError::Timeout { elapsed, attempts: attempt, source });
            }

            debug!(attempt = attempt + 1, max_attempts, "executing operation");

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SdkError::Cancelled),
                outcome = operation() => outcome,
            };

            match outcome {
                Ok(value) if check(&value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Ok(_) => last_error = SdkError::ConditionNotMet,
                Err(SdkError::Cancelled) => return Err(SdkError::Cancelled),
                Err(error) => {
                    if let Some(retry_if) = &self.retry_if {
                        if !retry_if(&error) {
                            debug!(%error, "error is not retryable");
                            return Err(error);
                        }
                    }
                    last_error = error;
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.next_delay(attempt, started);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %last_error,
                    "operation failed, retrying"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(SdkError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        warn!(attempts = max_attempts, error = %last_error, "all retry attempts exhausted");
        Err(SdkError::RetriesExhausted { attempts: max_attempts, source: Arc::new(last_error) })
    }

    fn deadline_passed(&self, started: Instant) -> Option<Duration> {
        let elapsed = started.elapsed();
        match self.config.max_total_time {
            Some(max) if elapsed >= max => Some(elapsed),
            _ => None,
        }
    }

    /// Backoff with jitter, never sleeping past the overall deadline.
    fn next_delay(&self, attempt: u32, started: Instant) -> Duration {
        let delay = self.config.jitter.apply(self.config.backoff.calculate_delay(attempt));
        match self.config.max_total_time {
            Some(max) => delay.min(max.saturating_sub(started.elapsed())),
            None => delay,
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("retry_if", &self.retry_if.is_some())
            .finish()
    }
}
