//! Eviction policy for terminal ledger records.

use std::time::{Duration, SystemTime};

use super::entry::ProgressEntry;
use crate::config::LedgerConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Terminal records older than this are dropped.
    pub max_age: Duration,
    /// Upper bound on records kept; oldest terminal records go first.
    pub max_entries: usize,
}

impl RetentionPolicy {
    pub(super) fn expired(&self, entry: &ProgressEntry, now: SystemTime) -> bool {
        if !entry.state.is_terminal() {
            return false;
        }
        now.duration_since(entry.updated_at)
            .map(|age| age > self.max_age)
            .unwrap_or(false)
    }
}

impl From<&LedgerConfig> for RetentionPolicy {
    fn from(cfg: &LedgerConfig) -> Self {
        Self {
            max_age: Duration::from_secs(cfg.retention_secs),
            max_entries: cfg.max_entries,
        }
    }
}
