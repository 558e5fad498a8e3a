//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures) and exponential backoff decisions so that the fetch
//! workers and the upload relay share a consistent policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::classify;
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
