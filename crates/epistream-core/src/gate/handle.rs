//! Caller-side handle on an admitted job.

use tokio::sync::watch;

use crate::job::{JobOutcome, ObjectId};

/// Resolves to the job's terminal outcome. Every caller attached to the same
/// job (the submitter and all followers) sees the same outcome.
#[derive(Debug, Clone)]
pub struct JobHandle {
    object_id: ObjectId,
    rx: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    pub(super) fn new(object_id: ObjectId, rx: watch::Receiver<Option<JobOutcome>>) -> Self {
        Self { object_id, rx }
    }

    /// A handle that is already resolved (e.g. the catalog had the object).
    pub(super) fn resolved(object_id: ObjectId, outcome: JobOutcome) -> Self {
        let (_tx, rx) = watch::channel(Some(outcome));
        Self { object_id, rx }
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    /// The outcome, if the job already finished.
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the job to finish.
    pub async fn wait(mut self) -> JobOutcome {
        if let Some(done) = self.outcome() {
            return done;
        }
        let seen = self.rx.wait_for(Option::is_some).await.map(|v| v.clone());
        match seen {
            Ok(Some(done)) => done,
            // Sender gone: it may still have published before dropping.
            _ => self.outcome().unwrap_or_else(abandoned),
        }
    }
}

fn abandoned() -> JobOutcome {
    JobOutcome::Failed {
        error: "job abandoned before finishing".to_string(),
    }
}
