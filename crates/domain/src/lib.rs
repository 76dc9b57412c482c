//! # Nimbus Domain
//!
//! Plain data types for the Nimbus cloud API runtime.
//!
//! This crate contains:
//! - The `SdkError` taxonomy and `Result` alias
//! - Request descriptors and the normalized response envelope
//! - Polling configuration
//! - Client configuration structures
//!
//! ## Architecture
//! - No dependencies on other Nimbus crates
//! - No I/O

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
