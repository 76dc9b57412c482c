//! # Nimbus Infrastructure
//!
//! I/O side of the SDK runtime.
//!
//! This crate contains:
//! - The HTTP request pipeline ([`RestClient`]) and its interceptors
//! - The [`CloudClient`] composition root
//! - Configuration loading from environment variables and files
//! - Conversions from transport errors into [`nimbus_domain::SdkError`]
//!
//! ## Architecture
//! - Builds on the token manager, retry and polling primitives of
//!   `nimbus-common`
//! - Depends on `nimbus-domain` for data types and errors

pub mod client;
pub mod config;
pub mod errors;
pub mod http;

// Re-export commonly used items
pub use client::{build_token_store, CloudClient, CloudClientBuilder};
pub use errors::InfraError;
pub use http::{
    AcceptJson, BearerAuth, FnInterceptor, Interceptor, InterceptorChain, RestClient,
    RestClientBuilder, StaticHeaders, UserAgent, DEFAULT_USER_AGENT, REQUEST_ID_HEADER,
};
