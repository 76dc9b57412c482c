//! Request, response and polling types shared by the runtime crates

pub mod polling;
pub mod request;
pub mod response;

pub use polling::{PollingConfig, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};
pub use request::{HttpMethod, RequestDescriptor};
pub use response::{ErrorPayload, Response};
