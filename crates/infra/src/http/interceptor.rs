//! Request interceptors
//!
//! An [`InterceptorChain`] is an ordered list of mutators applied to every
//! outgoing request after it is assembled and before it is sent. The first
//! failure aborts the request with [`SdkError::Preparation`]; nothing reaches
//! the network.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use nimbus_common::auth::TokenManager;
use nimbus_domain::SdkError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Request;
use tokio_util::sync::CancellationToken;

/// Default `User-Agent` for SDK requests.
pub const DEFAULT_USER_AGENT: &str = concat!("nimbus-sdk/", env!("CARGO_PKG_VERSION"));

/// Mutates an outgoing request.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Apply this interceptor to `request`.
    ///
    /// # Errors
    /// Any error aborts the request before it is sent.
    async fn intercept(
        &self,
        request: &mut Request,
        cancel: &CancellationToken,
    ) -> Result<(), SdkError>;

    /// Label used in logs and error messages.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Ordered interceptors, applied first to last.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor.
    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Names of the interceptors, in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run every interceptor against `request`.
    ///
    /// # Errors
    /// - [`SdkError::Cancelled`] if `cancel` fired
    /// - [`SdkError::Preparation`] naming the failing interceptor, with the
    ///   interceptor's own error as source
    pub async fn apply(
        &self,
        request: &mut Request,
        cancel: &CancellationToken,
    ) -> Result<(), SdkError> {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SdkError::Cancelled);
            }
            if let Err(err) = interceptor.intercept(request, cancel).await {
                if err.is_cancelled() {
                    return Err(err);
                }
                tracing::warn!(
                    index,
                    interceptor = interceptor.name(),
                    error = %err,
                    "request interceptor failed"
                );
                return Err(SdkError::Preparation {
                    message: format!("interceptor {index} ({}) failed", interceptor.name()),
                    source: Some(Arc::new(err)),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Adds `Authorization: Bearer <token>` from a [`TokenManager`].
#[derive(Debug, Clone)]
pub struct BearerAuth {
    tokens: Arc<TokenManager>,
}

impl BearerAuth {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Interceptor for BearerAuth {
    async fn intercept(
        &self,
        request: &mut Request,
        cancel: &CancellationToken,
    ) -> Result<(), SdkError> {
        let token = self.tokens.get_token(cancel).await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SdkError::auth("access token contains characters not allowed in a header"))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bearer_auth"
    }
}

/// Adds fixed headers unless the request already carries them.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    /// # Errors
    /// Returns [`SdkError::Config`] for names or values that are not valid
    /// HTTP headers.
    pub fn from_map(headers: &BTreeMap<String, String>) -> Result<Self, SdkError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SdkError::Config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SdkError::Config(format!("invalid value for header '{name}': {e}")))?;
            map.insert(name, value);
        }
        Ok(Self { headers: map })
    }
}

#[async_trait]
impl Interceptor for StaticHeaders {
    async fn intercept(
        &self,
        request: &mut Request,
        _cancel: &CancellationToken,
    ) -> Result<(), SdkError> {
        let target = request.headers_mut();
        for (name, value) in &self.headers {
            if !target.contains_key(name) {
                target.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "static_headers"
    }
}

/// Sets `User-Agent` unless already present.
#[derive(Debug, Clone)]
pub struct UserAgent(HeaderValue);

impl UserAgent {
    /// # Errors
    /// Returns [`SdkError::Config`] if `agent` is not a valid header value.
    pub fn new(agent: &str) -> Result<Self, SdkError> {
        HeaderValue::from_str(agent)
            .map(Self)
            .map_err(|e| SdkError::Config(format!("invalid user agent: {e}")))
    }
}

impl Default for UserAgent {
    fn default() -> Self {
        Self(HeaderValue::from_static(DEFAULT_USER_AGENT))
    }
}

#[async_trait]
impl Interceptor for UserAgent {
    async fn intercept(
        &self,
        request: &mut Request,
        _cancel: &CancellationToken,
    ) -> Result<(), SdkError> {
        request.headers_mut().entry(USER_AGENT).or_insert_with(|| self.0.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "user_agent"
    }
}

/// Sets `Accept: application/json` unless already present.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptJson;

#[async_trait]
impl Interceptor for AcceptJson {
    async fn intercept(
        &self,
        request: &mut Request,
        _cancel: &CancellationToken,
    ) -> Result<(), SdkError> {
        request
            .headers_mut()
            .entry(ACCEPT)
            .or_insert_with(|| HeaderValue::from_static("application/json"));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "accept_json"
    }
}

/// Adapts a synchronous closure into an interceptor.
pub struct FnInterceptor<F> {
    name: &'static str,
    apply: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(&mut Request) -> Result<(), SdkError> + Send + Sync,
{
    pub fn new(name: &'static str, apply: F) -> Self {
        Self { name, apply }
    }
}

#[async_trait]
impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&mut Request) -> Result<(), SdkError> + Send + Sync,
{
    async fn intercept(
        &self,
        request: &mut Request,
        _cancel: &CancellationToken,
    ) -> Result<(), SdkError> {
        (self.apply)(request)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl<F> fmt::Debug for FnInterceptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInterceptor").field("name", &self.name).finish_non_exhaustive()
    }
}
