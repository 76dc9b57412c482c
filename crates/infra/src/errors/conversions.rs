//! Conversions from external infrastructure errors into SDK errors.

use std::sync::Arc;

use nimbus_domain::{SdkError, TransportKind};
use reqwest::Error as HttpError;
use url::ParseError as UrlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the SDK error.
#[derive(Debug)]
pub struct InfraError(pub SdkError);

impl From<InfraError> for SdkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SdkError> for InfraError {
    fn from(value: SdkError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSdkError {
    fn into_sdk(self) -> SdkError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SdkError */
/* -------------------------------------------------------------------------- */

impl IntoSdkError for HttpError {
    fn into_sdk(self) -> SdkError {
        // The URL may carry query parameters; keep it out of the message.
        let err = self.without_url();

        if err.is_builder() {
            return SdkError::preparation(format!("invalid HTTP request: {err}"));
        }
        let (kind, context) = if err.is_timeout() {
            (TransportKind::Timeout, "request timed out")
        } else if is_connect(&err) {
            (TransportKind::Connect, "connection failed")
        } else if err.is_body() || err.is_decode() {
            (TransportKind::Body, "failed to read response body")
        } else if err.is_redirect() {
            (TransportKind::Redirect, "redirect policy violated")
        } else {
            (TransportKind::Other, "request failed")
        };
        SdkError::Transport {
            kind,
            message: format!("{context}: {err}"),
            source: Some(Arc::new(err)),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn is_connect(err: &HttpError) -> bool {
    err.is_connect()
}

#[cfg(target_arch = "wasm32")]
fn is_connect(_err: &HttpError) -> bool {
    false
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_sdk())
    }
}

/* -------------------------------------------------------------------------- */
/* url::ParseError → SdkError */
/* -------------------------------------------------------------------------- */

impl IntoSdkError for UrlError {
    fn into_sdk(self) -> SdkError {
        SdkError::preparation(format!("invalid request URL: {self}"))
    }
}

impl From<UrlError> for InfraError {
    fn from(value: UrlError) -> Self {
        InfraError(value.into_sdk())
    }
}
