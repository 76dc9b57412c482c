//! Resource state polling
//!
//! Blocks until a remotely observed resource reaches a terminal state. Used
//! as a gate before dependent operations, for example not creating a subnet
//! until its network reports `Active`.
//!
//! ```no_run
//! # async fn demo(cancel: tokio_util::sync::CancellationToken) -> nimbus_domain::Result<()> {
//! use std::time::Duration;
//!
//! use nimbus_common::polling::wait_for_state;
//! use nimbus_domain::PollingConfig;
//!
//! let config = PollingConfig::until(&["Active"]).with_interval(Duration::from_secs(2));
//! let outcome = wait_for_state(&cancel, "vpc", "vpc-42", |_cancel| async {
//!     Ok::<_, nimbus_domain::SdkError>("Active".to_string())
//! }, config)
//! .await?;
//! assert_eq!(outcome.state, "Active");
//! # Ok(())
//! # }
//! ```

pub mod poller;

pub use poller::{wait_for_state, PollOutcome, StatePoller};
