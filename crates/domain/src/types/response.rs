//! Normalized response envelope and the generic error payload

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SdkError};

/// Problem document returned by the API on 4xx/5xx responses.
///
/// Unknown members are preserved in [`ErrorPayload::extensions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Problem type URI
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Short summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// HTTP status echoed by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Detailed explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// URI of the failing occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Additional members
    #[serde(flatten)]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// Result of one HTTP round trip.
///
/// `data` is only ever set for 2xx responses with a body, `error` only for
/// responses with status >= 400 whose body decoded. Both may be absent.
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// HTTP status code
    pub status: u16,
    /// Response headers, lower-case names, repeated values joined with `", "`
    pub headers: BTreeMap<String, String>,
    /// Full response body
    pub raw_body: Vec<u8>,
    /// Decoded success payload
    pub data: Option<T>,
    /// Decoded error payload
    pub error: Option<ErrorPayload>,
}

impl<T> Response<T> {
    /// `200..300`
    pub const fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// `>= 400`
    pub const fn is_error(&self) -> bool {
        is_error_status(self.status)
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Raw body as UTF-8 text, lossily converted.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw_body).into_owned()
    }

    /// Envelope that leaves the success payload undecoded.
    ///
    /// Error bodies are still decoded best-effort into [`ErrorPayload`].
    pub fn undecoded(status: u16, headers: BTreeMap<String, String>, raw_body: Vec<u8>) -> Self {
        let error = if is_error_status(status) && !raw_body.is_empty() {
            serde_json::from_slice::<ErrorPayload>(&raw_body).ok()
        } else {
            None
        };
        Self { status, headers, raw_body, data: None, error }
    }

    /// Consume the envelope, turning an error status into an [`SdkError`].
    ///
    /// Convenience for callers that only care about the success payload.
    ///
    /// # Errors
    /// Returns [`SdkError::Api`] carrying the status and problem detail
    /// when the response was not a success.
    pub fn into_data(self) -> Result<Option<T>> {
        if self.is_success() {
            return Ok(self.data);
        }
        let summary = self
            .error
            .as_ref()
            .and_then(|e| e.detail.clone().or_else(|| e.title.clone()))
            .unwrap_or_else(|| self.text());
        Err(SdkError::Api { status: self.status, message: summary })
    }
}

impl<T: DeserializeOwned> Response<T> {
    /// Classify a fully read response.
    ///
    /// # Errors
    /// Returns [`SdkError::Decode`] when a 2xx body is present but does not
    /// decode into `T`. Error bodies that fail to decode are tolerated.
    pub fn from_parts(
        status: u16,
        headers: BTreeMap<String, String>,
        raw_body: Vec<u8>,
    ) -> Result<Self> {
        let mut response = Self::undecoded(status, headers, raw_body);
        if response.is_success() && !response.raw_body.is_empty() {
            let decoded = serde_json::from_slice::<T>(&response.raw_body).map_err(|e| {
                SdkError::Decode {
                    status,
                    message: e.to_string(),
                    raw_body: Arc::from(response.raw_body.as_slice()),
                }
            })?;
            response.data = Some(decoded);
        }
        Ok(response)
    }
}

const fn is_success_status(status: u16) -> bool {
    status >= 200 && status < 300
}

const fn is_error_status(status: u16) -> bool {
    status >= 400
}
