//! Outbound request descriptor

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::errors::{Result, SdkError};

/// HTTP verbs supported by the request pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
}

impl HttpMethod {
    /// Upper-case wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the pipeline needs to perform one round trip.
///
/// Created per call and consumed by `RestClient::execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: HttpMethod,
    /// Path appended to the configured base URL
    pub path: String,
    /// Query parameters, URL-encoded by the pipeline
    pub query: BTreeMap<String, String>,
    /// Caller supplied headers
    pub headers: BTreeMap<String, String>,
    /// Fully buffered body
    pub body: Option<Vec<u8>>,
}

impl RequestDescriptor {
    /// Create a descriptor with no query, headers or body.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// `GET <path>`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// `POST <path>`
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// `PUT <path>`
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    /// `DELETE <path>`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as JSON and attach it as the body.
    ///
    /// # Errors
    /// Returns [`SdkError::Preparation`] if serialization fails.
    pub fn json_body<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| SdkError::preparation(format!("failed to serialize body: {e}")))?;
        self.body = Some(bytes);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_query_headers_and_body() {
        let req = RequestDescriptor::post("/networks")
            .query("api-version", "1.0")
            .header("X-Trace", "abc")
            .json_body(&serde_json::json!({ "name": "net-1" }))
            .unwrap();

        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.query.get("api-version").map(String::as_str), Some("1.0"));
        assert_eq!(req.headers.get("X-Trace").map(String::as_str), Some("abc"));
        assert_eq!(req.body.as_deref(), Some(br#"{"name":"net-1"}"#.as_slice()));
    }

    #[test]
    fn method_display_is_upper_case() {
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }
}
