//! Read-side view of one ledger record.

use serde::Serialize;
use std::time::SystemTime;

use crate::job::JobState;

/// Snapshot of fetch progress for one object id.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEntry {
    pub state: JobState,
    pub bytes_written: u64,
    /// Unknown until the source reports a length.
    pub bytes_total: Option<u64>,
    #[serde(skip)]
    pub updated_at: SystemTime,
    /// Terminal error for `Failed`.
    pub error: Option<String>,
}

impl ProgressEntry {
    pub(super) fn queued() -> Self {
        Self {
            state: JobState::Queued,
            bytes_written: 0,
            bytes_total: None,
            updated_at: SystemTime::now(),
            error: None,
        }
    }

    /// `100 * written / total`, or None while the total is unknown.
    /// Callers must treat None as "not ready" for buffer-threshold decisions.
    pub fn percentage(&self) -> Option<f64> {
        if self.state == JobState::Completed {
            return Some(100.0);
        }
        match self.bytes_total {
            Some(0) | None => None,
            Some(total) => Some((self.bytes_written as f64 * 100.0 / total as f64).min(100.0)),
        }
    }

    /// True while a worker may still append bytes.
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}
