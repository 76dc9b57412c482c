use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use nimbus_domain::{HttpMethod, RequestDescriptor, Response, SdkError, DEFAULT_HTTP_TIMEOUT_SECS};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as ReqwestClient, Method, Request};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, instrument, Span};
use url::Url;
use uuid::Uuid;

use super::interceptor::{Interceptor, InterceptorChain};
use crate::errors::InfraError;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Executes [`RequestDescriptor`]s against a base URL.
///
/// Each call builds the URL from the base and the descriptor's path and
/// query, applies the caller's headers and then the interceptor chain, sends
/// the request once and classifies the response into a [`Response`]
/// envelope. The client never retries; that is left to the caller or to
/// `nimbus_common::sync::call_with_retry`.
#[derive(Clone)]
pub struct RestClient {
    http: ReqwestClient,
    base_url: String,
    chain: InterceptorChain,
}

struct RawResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl RestClient {
    /// Start building a client for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> RestClientBuilder {
        RestClientBuilder::new(base_url)
    }

    /// Base URL request paths are appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Interceptors applied to every request, in order.
    pub fn interceptors(&self) -> &InterceptorChain {
        &self.chain
    }

    /// Execute one round trip and decode a success body into `T`.
    ///
    /// Non-2xx statuses are not errors: they come back as an envelope with
    /// `error` set when the body is a problem document.
    ///
    /// # Errors
    /// - [`SdkError::Preparation`] for an invalid URL or header, or a failing
    ///   interceptor; nothing is sent in that case
    /// - [`SdkError::Transport`] when the request cannot be sent or the body
    ///   cannot be read
    /// - [`SdkError::Decode`] when a 2xx body does not decode into `T`
    /// - [`SdkError::Cancelled`] when `cancel` fires first
    #[instrument(
        skip(self, cancel, descriptor),
        fields(method = %descriptor.method, path = %descriptor.path, request_id = field::Empty)
    )]
    pub async fn execute<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        descriptor: RequestDescriptor,
    ) -> Result<Response<T>, SdkError> {
        let raw = self.round_trip(cancel, &descriptor).await?;
        Response::from_parts(raw.status, raw.headers, raw.body)
    }

    /// Like [`RestClient::execute`] but leaves the success body undecoded.
    ///
    /// # Errors
    /// Same as [`RestClient::execute`], minus [`SdkError::Decode`].
    #[instrument(
        skip(self, cancel, descriptor),
        fields(method = %descriptor.method, path = %descriptor.path, request_id = field::Empty)
    )]
    pub async fn execute_raw(
        &self,
        cancel: &CancellationToken,
        descriptor: RequestDescriptor,
    ) -> Result<Response<()>, SdkError> {
        let raw = self.round_trip(cancel, &descriptor).await?;
        Ok(Response::undecoded(raw.status, raw.headers, raw.body))
    }

    /// `GET <path>`
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Response<T>, SdkError> {
        self.execute(cancel, RequestDescriptor::get(path)).await
    }

    /// `POST <path>` with a JSON body.
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn post<B, T>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &B,
    ) -> Result<Response<T>, SdkError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(cancel, RequestDescriptor::post(path).json_body(body)?).await
    }

    /// `PUT <path>` with a JSON body.
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn put<B, T>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &B,
    ) -> Result<Response<T>, SdkError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(cancel, RequestDescriptor::put(path).json_body(body)?).await
    }

    /// `DELETE <path>`
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn delete<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Response<T>, SdkError> {
        self.execute(cancel, RequestDescriptor::delete(path)).await
    }

    async fn round_trip(
        &self,
        cancel: &CancellationToken,
        descriptor: &RequestDescriptor,
    ) -> Result<RawResponse, SdkError> {
        if cancel.is_cancelled() {
            return Err(SdkError::Cancelled);
        }

        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", field::display(&request_id));

        let mut request = self.build_request(descriptor)?;
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            request.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        self.chain.apply(&mut request, cancel).await?;

        debug!(
            url = %request.url(),
            headers = ?sanitize_headers(request.headers()),
            "sending HTTP request"
        );

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SdkError::Cancelled),
            sent = self.http.execute(request) => sent.map_err(InfraError::from)?,
        };

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SdkError::Cancelled),
            body = response.bytes() => body.map_err(InfraError::from)?,
        };

        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "received HTTP response"
        );

        Ok(RawResponse { status, headers, body: body.to_vec() })
    }

    fn build_request(&self, descriptor: &RequestDescriptor) -> Result<Request, SdkError> {
        let mut url = Url::parse(&join_url(&self.base_url, &descriptor.path)).map_err(InfraError::from)?;
        if !descriptor.query.is_empty() {
            url.query_pairs_mut().extend_pairs(descriptor.query.iter());
        }

        let mut request = Request::new(to_method(descriptor.method), url);

        if let Some(body) = &descriptor.body {
            *request.body_mut() = Some(body.clone().into());
            let has_content_type =
                descriptor.headers.keys().any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
            if !has_content_type {
                request
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
        }

        for (name, value) in &descriptor.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SdkError::preparation(format!("invalid header name '{name}': {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| SdkError::preparation(format!("invalid value for header '{name}': {e}")))?;
            request.headers_mut().insert(header_name, header_value);
        }

        Ok(request)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("interceptors", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RestClient`].
#[derive(Debug)]
pub struct RestClientBuilder {
    base_url: String,
    timeout: Duration,
    chain: InterceptorChain,
    client: Option<ReqwestClient>,
}

impl RestClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            chain: InterceptorChain::new(),
            client: None,
        }
    }

    /// Per-request timeout of the default HTTP client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append an interceptor to the chain.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.chain = self.chain.with(interceptor);
        self
    }

    /// Replace the whole chain.
    pub fn interceptors(mut self, chain: InterceptorChain) -> Self {
        self.chain = chain;
        self
    }

    /// Use a preconfigured reqwest client; `timeout` is then ignored.
    pub fn http_client(mut self, client: ReqwestClient) -> Self {
        self.client = Some(client);
        self
    }

    /// # Errors
    /// Returns [`SdkError::Config`] for an invalid base URL or when the
    /// underlying HTTP client cannot be created.
    pub fn build(self) -> Result<RestClient, SdkError> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| SdkError::Config(format!("invalid base URL '{}': {e}", self.base_url)))?;
        if parsed.cannot_be_a_base() {
            return Err(SdkError::Config(format!("base URL '{}' cannot be a base", self.base_url)));
        }

        let http = match self.client {
            Some(client) => client,
            None => ReqwestClient::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {e}")))?,
        };

        Ok(RestClient {
            http,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            chain: self.chain,
        })
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}

/// Lower-case names; repeated headers are joined with `", "`.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

/// Header list safe to log: credentials are redacted.
fn sanitize_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == AUTHORIZATION {
                match value.to_str() {
                    Ok(v) if v.starts_with("Bearer ") => "Bearer [REDACTED]".to_string(),
                    _ => "[REDACTED]".to_string(),
                }
            } else if value.is_sensitive() {
                "[REDACTED]".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}
