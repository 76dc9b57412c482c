//! State poller configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of accessor calls before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Default pause between accessor calls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a state poll proceeds and which labels end it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Maximum number of accessor calls
    pub max_attempts: u32,
    /// Pause before each accessor call
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    /// States that end the poll successfully
    pub success_states: Vec<String>,
    /// States that end the poll with `ResourceFailed`
    pub failure_states: Vec<String>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
            success_states: vec!["Active".to_string()],
            failure_states: vec!["Failed".to_string(), "Error".to_string()],
        }
    }
}

impl PollingConfig {
    /// Wait for `states` instead of the default `Active`.
    #[must_use]
    pub fn until(states: &[&str]) -> Self {
        Self { success_states: states.iter().map(ToString::to_string).collect(), ..Self::default() }
    }

    /// Override the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the failure states.
    #[must_use]
    pub fn with_failure_states(mut self, states: &[&str]) -> Self {
        self.failure_states = states.iter().map(ToString::to_string).collect();
        self
    }

    /// Replace zero or empty fields with their defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_attempts == 0 {
            self.max_attempts = defaults.max_attempts;
        }
        if self.interval.is_zero() {
            self.interval = defaults.interval;
        }
        if self.success_states.is_empty() {
            self.success_states = defaults.success_states;
        }
        if self.failure_states.is_empty() {
            self.failure_states = defaults.failure_states;
        }
        self
    }

    /// Whether `state` ends the poll successfully.
    pub fn is_success(&self, state: &str) -> bool {
        self.success_states.iter().any(|s| s == state)
    }

    /// Whether `state` ends the poll with a failure.
    pub fn is_failure(&self, state: &str) -> bool {
        self.failure_states.iter().any(|s| s == state)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PollingConfig::default();
        assert_eq!(config.max_attempts, 30);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert!(config.is_success("Active"));
        assert!(config.is_failure("Failed"));
        assert!(config.is_failure("Error"));
        assert!(!config.is_success("Creating"));
    }

    #[test]
    fn normalized_fills_zero_and_empty_fields() {
        let config = PollingConfig {
            max_attempts: 0,
            interval: Duration::ZERO,
            success_states: vec![],
            failure_states: vec!["Deleted".into()],
        }
        .normalized();

        assert_eq!(config.max_attempts, 30);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.success_states, vec!["Active".to_string()]);
        assert_eq!(config.failure_states, vec!["Deleted".to_string()]);
    }

    #[test]
    fn interval_round_trips_as_milliseconds() {
        let config = PollingConfig::until(&["Running"]).with_interval(Duration::from_millis(250));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["interval"], 250);
        let back: PollingConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
