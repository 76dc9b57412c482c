//! Asynchronous completion primitives
//!
//! ## Submodules
//!
//! - **`completion`**: [`Completion`], a cached one-shot result handle, plus
//!   the [`call_with_retry`] and [`wait_for`] helpers that run a retry loop
//!   in the background and hand back a `Completion`
//!
//! The retry loop itself is [`crate::resilience::RetryExecutor`].

pub mod completion;

pub use completion::{call_with_retry, wait_for, Completion};
