//! Assertions for `SdkError` results

// These assertions panic on failure by design of a test helper
#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

/// Assert that a result is an error whose message contains a substring.
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// let result: Result<(), String> = Err("after 2 retries: refused".to_string());
/// nimbus_common::assert_error_contains!(result, "after 2 retries");
/// # }
/// ```
#[macro_export]
macro_rules! assert_error_contains {
    ($result:expr, $substring:expr) => {
        match &$result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => {
                let error_msg = format!("{}", e);
                assert!(
                    error_msg.contains($substring),
                    "Error message '{}' does not contain '{}'",
                    error_msg,
                    $substring
                );
            }
        }
    };
}

/// Assert that a result is an error matching a pattern.
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use nimbus_domain::SdkError;
///
/// let result: Result<(), SdkError> = Err(SdkError::Cancelled);
/// nimbus_common::assert_sdk_error!(result, SdkError::Cancelled);
/// # }
/// ```
#[macro_export]
macro_rules! assert_sdk_error {
    ($result:expr, $pattern:pat $(if $guard:expr)? $(,)?) => {
        match &$result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => assert!(
                matches!(e, $pattern $(if $guard)?),
                "Error {:?} does not match {}",
                e,
                stringify!($pattern)
            ),
        }
    };
}

/// Assert that `actual` lies within `tolerance` of `expected`.
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let lower = expected.saturating_sub(tolerance);
    let upper = expected + tolerance;
    assert!(
        actual >= lower && actual <= upper,
        "Duration {actual:?} not within {tolerance:?} of {expected:?}"
    );
}
