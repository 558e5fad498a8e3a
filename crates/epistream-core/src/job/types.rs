//! Priority tiers, job states and terminal outcomes.

use serde::{Deserialize, Serialize};

/// Scheduling tier. Interactive (single episode) requests are always picked
/// before background (season batch) ones; FIFO inside a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "HIGH")]
    Interactive,
    #[serde(rename = "LOW")]
    Background,
}

impl Priority {
    /// Queue index: lower is served first.
    pub(crate) fn tier(self) -> usize {
        match self {
            Priority::Interactive => 0,
            Priority::Background => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Interactive => "HIGH",
            Priority::Background => "LOW",
        }
    }
}

/// Fetch state of one job. Transitions only move forward:
/// `Queued -> Fetching -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Fetching,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Fetching => "fetching",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Fetching => 1,
            JobState::Completed | JobState::Failed => 2,
        }
    }

    /// True if moving from `self` to `next` is allowed (staying put is allowed).
    pub fn can_advance_to(self, next: JobState) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Terminal result delivered to every caller attached to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Fetched and relayed; the catalog records `remote_url`.
    Uploaded { remote_url: String },
    /// Fetched locally but the relay failed; the local file is kept.
    FetchedOnly { error: String },
    /// The fetch exhausted its retry budget.
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        assert!(JobState::Queued.can_advance_to(JobState::Fetching));
        assert!(JobState::Fetching.can_advance_to(JobState::Completed));
        assert!(JobState::Fetching.can_advance_to(JobState::Failed));
        assert!(JobState::Queued.can_advance_to(JobState::Failed));
        assert!(JobState::Fetching.can_advance_to(JobState::Fetching));
        assert!(!JobState::Fetching.can_advance_to(JobState::Queued));
        assert!(!JobState::Completed.can_advance_to(JobState::Failed));
        assert!(!JobState::Failed.can_advance_to(JobState::Fetching));
    }

    #[test]
    fn priority_wire_names() {
        assert_eq!(serde_json::to_string(&Priority::Interactive).unwrap(), "\"HIGH\"");
        assert_eq!(serde_json::to_string(&Priority::Background).unwrap(), "\"LOW\"");
        assert!(Priority::Interactive.tier() < Priority::Background.tier());
    }
}
