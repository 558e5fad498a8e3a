//! Transfer error type for retry classification.

use std::time::Duration;

/// Error returned by one transfer attempt (source fetch or storage chunk upload).
/// Kept structured so we can classify and decide retries before surfacing anything.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// The attempt exceeded its wall-clock or idle bound.
    #[error("{what} timed out after {after:?}")]
    TimedOut { what: &'static str, after: Duration },
    /// Stream ended before the advertised length was received. Retried rather
    /// than accepted as a short file.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// The remote side dropped the stream or refused it for a transient reason.
    #[error("connection: {0}")]
    Connection(String),
    /// The remote object does not exist. Not retried.
    #[error("not found: {0}")]
    NotFound(String),
    /// Local disk read/write failed (e.g. disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
}
