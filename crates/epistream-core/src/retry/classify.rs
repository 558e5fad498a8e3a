//! Map transfer errors onto retry classes.

use super::error::TransferError;
use super::policy::ErrorKind;

/// Retry class of a failed attempt against the source or the object store.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Curl(ce) => curl_kind(ce),
        TransferError::Http(code) => status_kind(*code),
        TransferError::TimedOut { .. } => ErrorKind::Timeout,
        // A stream that ended early resumes from the persisted offset.
        TransferError::PartialTransfer { .. } | TransferError::Connection(_) => {
            ErrorKind::Connection
        }
        TransferError::NotFound(_) | TransferError::Storage(_) => ErrorKind::Other,
    }
}

fn status_kind(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

fn curl_kind(e: &curl::Error) -> ErrorKind {
    let dropped = e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_send_error()
        || e.is_recv_error()
        || e.is_read_error()
        || e.is_got_nothing()
        || e.is_partial_file();
    if e.is_operation_timedout() {
        ErrorKind::Timeout
    } else if dropped {
        ErrorKind::Connection
    } else {
        ErrorKind::Other
    }
}
