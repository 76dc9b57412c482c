//! Sequential state poller

use std::future::Future;

use nimbus_domain::{PollingConfig, SdkError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Terminal success of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// The success state that ended the poll
    pub state: String,
    /// Number of accessor calls made, including the successful one
    pub attempts: u32,
}

/// Polls a state accessor until it reports a success or failure state.
///
/// Accessor calls are strictly sequential, and each one is preceded by a
/// sleep of `interval`, so a poll never checks more than once per interval.
#[derive(Debug, Clone, Default)]
pub struct StatePoller {
    config: PollingConfig,
}

impl StatePoller {
    /// Zero or empty fields of `config` fall back to the defaults.
    pub fn new(config: PollingConfig) -> Self {
        Self { config: config.normalized() }
    }

    /// Normalized polling settings.
    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Wait for the resource `kind`/`id` to reach a success state.
    ///
    /// Accessor errors are treated as transient: they are logged and the
    /// attempt is counted, but polling continues.
    ///
    /// # Errors
    /// - [`SdkError::Cancelled`] once `cancel` fires
    /// - [`SdkError::ResourceFailed`] as soon as a failure state is seen
    /// - [`SdkError::PollTimeout`] when the attempt budget runs out, carrying
    ///   the last state observed
    #[instrument(skip(self, cancel, accessor), fields(max_attempts = self.config.max_attempts))]
    pub async fn wait_for_state<F, Fut>(
        &self,
        cancel: &CancellationToken,
        kind: &str,
        id: &str,
        mut accessor: F,
    ) -> Result<PollOutcome, SdkError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<String, SdkError>>,
    {
        let mut last_state: Option<String> = None;

        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(SdkError::Cancelled);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SdkError::Cancelled),
                () = tokio::time::sleep(self.config.interval) => {}
            }

            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SdkError::Cancelled),
                fetched = accessor(cancel.clone()) => fetched,
            };

            let state = match fetched {
                Ok(state) => state,
                Err(err) if err.is_cancelled() && cancel.is_cancelled() => {
                    return Err(SdkError::Cancelled);
                }
                Err(err) => {
                    warn!(kind, id, attempt, error = %err, "state check failed, will retry");
                    continue;
                }
            };

            if self.config.is_success(&state) {
                info!(kind, id, attempt, state = %state, "resource reached target state");
                return Ok(PollOutcome { state, attempts: attempt });
            }

            if self.config.is_failure(&state) {
                warn!(kind, id, attempt, state = %state, "resource reached failure state");
                return Err(SdkError::ResourceFailed {
                    kind: kind.to_string(),
                    id: id.to_string(),
                    state,
                });
            }

            debug!(kind, id, attempt, state = %state, "resource not ready");
            last_state = Some(state);
        }

        Err(SdkError::PollTimeout {
            kind: kind.to_string(),
            id: id.to_string(),
            attempts: self.config.max_attempts,
            last_state,
        })
    }
}

/// Poll once with `config`, without keeping a [`StatePoller`] around.
///
/// # Errors
/// See [`StatePoller::wait_for_state`].
pub async fn wait_for_state<F, Fut>(
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
    StatePoller::new(config).wait_for_state(cancel, kind, id, accessor).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::mocks::StateSequence;

    fn fast(attempts: u32) -> PollingConfig {
        PollingConfig::until(&["Active"])
            .with_max_attempts(attempts)
            .with_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn succeeds_after_transitional_states() {
        let states = StateSequence::new(["Creating", "Creating", "Active"]);
        let outcome = StatePoller::new(fast(10))
            .wait_for_state(&CancellationToken::new(), "vpc", "vpc-1", states.accessor())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome { state: "Active".into(), attempts: 3 });
        assert_eq!(states.calls(), 3);
    }

    #[tokio::test]
    async fn accessor_errors_are_retried() {
        let states = StateSequence::scripted(vec![
            Err(SdkError::transport("reset")),
            Ok("Creating".into()),
            Ok("Active".into()),
        ]);
        let outcome = StatePoller::new(fast(5))
            .wait_for_state(&CancellationToken::new(), "vpc", "vpc-1", states.accessor())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn failure_state_returns_immediately() {
        let states = StateSequence::new(["Failed"]);
        let err = StatePoller::new(fast(30))
            .wait_for_state(&CancellationToken::new(), "subnet", "sn-9", states.accessor())
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::ResourceFailed { ref state, .. } if state == "Failed"));
        assert_eq!(states.calls(), 1);
    }

    #[tokio::test]
    async fn custom_failure_states() {
        let states = StateSequence::new(["Creating", "Deleted"]);
        let config = fast(10).with_failure_states(&["Deleted"]);
        let err = wait_for_state(
            &CancellationToken::new(),
            "volume",
            "vol-3",
            states.accessor(),
            config,
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "volume vol-3 reached failure state: Deleted");
    }

    #[tokio::test]
    async fn exhaustion_reports_last_state() {
        let states = StateSequence::new(["Creating"]);
        let err = StatePoller::new(fast(3))
            .wait_for_state(&CancellationToken::new(), "vpc", "vpc-1", states.accessor())
            .await
            .unwrap_err();

        match err {
            SdkError::PollTimeout { attempts, last_state, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_state.as_deref(), Some("Creating"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(states.calls(), 3);
    }

    #[tokio::test]
    async fn exhaustion_with_only_errors_has_no_last_state() {
        let states = StateSequence::scripted(vec![Err(SdkError::transport("down"))]);
        let err = StatePoller::new(fast(2))
            .wait_for_state(&CancellationToken::new(), "vpc", "vpc-1", states.accessor())
            .await
            .unwrap_err();

        assert!(err.to_string().ends_with("(last state: unknown)"));
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let states = StateSequence::new(["Active"]);

        let err = StatePoller::new(fast(3))
            .wait_for_state(&cancel, "vpc", "vpc-1", states.accessor())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(states.calls(), 0);
    }
}
