//! HTTP request pipeline
//!
//! - [`RestClient`]: descriptor in, [`nimbus_domain::Response`] envelope out
//! - [`InterceptorChain`]: ordered request mutators (auth, headers)

pub mod client;
pub mod interceptor;

pub use client::{RestClient, RestClientBuilder, REQUEST_ID_HEADER};
pub use interceptor::{
    AcceptJson, BearerAuth, FnInterceptor, Interceptor, InterceptorChain, StaticHeaders, UserAgent,
    DEFAULT_USER_AGENT,
};
