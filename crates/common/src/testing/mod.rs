//! Testing utilities and helpers
//!
//! - **[`assertions`]**: assertion macros for `SdkError` results
//! - **[`mocks`]**: mock token issuer and scripted state accessor
//!
//! Available to unit tests and, with the `test-utils` feature, to
//! integration tests and downstream crates.

pub mod assertions;
pub mod mocks;

pub use mocks::{MockTokenIssuer, StateSequence};
