//! Two-tier FIFO job queue shared by the admission gate (producer) and the
//! fetch workers (consumers).

use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::Notify;

use crate::job::{ObjectId, Priority};

/// One queued fetch. The gate creates it; exactly one worker consumes it.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub object_id: ObjectId,
    pub priority: Priority,
    /// Human-readable series / season / episode, for logs.
    pub label: Option<String>,
    /// Exclusively owned by this job until it completes.
    pub local_path: PathBuf,
    /// The artifact is already complete on disk; only the relay is left.
    pub relay_only: bool,
    pub enqueued_at: Instant,
}

/// Queue depth per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub interactive: usize,
    pub background: usize,
}

#[derive(Default)]
struct QueueState {
    tiers: [VecDeque<FetchJob>; 2],
    closed: bool,
}

#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").field("counts", &self.counts()).finish()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append to the back of the job's tier. Returns false once closed.
    pub fn push(&self, job: FetchJob) -> bool {
        {
            let mut st = self.lock();
            if st.closed {
                return false;
            }
            st.tiers[job.priority.tier()].push_back(job);
        }
        self.notify.notify_one();
        true
    }

    /// Move a queued background job to the back of the interactive tier.
    /// Returns false if the job isn't waiting in the background tier.
    pub fn promote(&self, id: &ObjectId) -> bool {
        let mut st = self.lock();
        let bg = Priority::Background.tier();
        let Some(pos) = st.tiers[bg].iter().position(|j| &j.object_id == id) else {
            return false;
        };
        if let Some(mut job) = st.tiers[bg].remove(pos) {
            job.priority = Priority::Interactive;
            st.tiers[Priority::Interactive.tier()].push_back(job);
        }
        true
    }

    fn try_pop(st: &mut QueueState) -> Option<FetchJob> {
        st.tiers.iter_mut().find_map(|t| t.pop_front())
    }

    /// Wait for the next job: highest tier first, FIFO within a tier.
    /// Returns None once the queue is closed and drained.
    pub async fn pop(&self) -> Option<FetchJob> {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let mut st = self.lock();
                if let Some(job) = Self::try_pop(&mut st) {
                    let more = st.tiers.iter().any(|t| !t.is_empty());
                    drop(st);
                    if more {
                        // Pass the wakeup on; permits don't accumulate.
                        self.notify.notify_one();
                    }
                    return Some(job);
                }
                if st.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and wake every idle worker. Jobs still queued are
    /// returned so the caller can fail them.
    pub fn close(&self) -> Vec<FetchJob> {
        let drained: Vec<FetchJob> = {
            let mut st = self.lock();
            st.closed = true;
            let jobs: Vec<FetchJob> = st.tiers.iter_mut().flat_map(|t| t.drain(..)).collect();
            jobs
        };
        self.notify.notify_waiters();
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn counts(&self) -> QueueCounts {
        let st = self.lock();
        QueueCounts {
            interactive: st.tiers[Priority::Interactive.tier()].len(),
            background: st.tiers[Priority::Background.tier()].len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn job(id: &str, priority: Priority) -> FetchJob {
        FetchJob {
            object_id: ObjectId::new(id).unwrap(),
            priority,
            label: None,
            local_path: PathBuf::from(format!("/tmp/{id}.bin")),
            relay_only: false,
            enqueued_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn interactive_first_fifo_within_tier() {
        let q = JobQueue::new();
        q.push(job("b1", Priority::Background));
        q.push(job("i1", Priority::Interactive));
        q.push(job("b2", Priority::Background));
        q.push(job("i2", Priority::Interactive));
        let order: Vec<String> = [
            q.pop().await.unwrap(),
            q.pop().await.unwrap(),
            q.pop().await.unwrap(),
            q.pop().await.unwrap(),
        ]
        .iter()
        .map(|j| j.object_id.to_string())
        .collect();
        assert_eq!(order, vec!["i1", "i2", "b1", "b2"]);
    }

    #[tokio::test]
    async fn promote_moves_to_back_of_interactive() {
        let q = JobQueue::new();
        q.push(job("b1", Priority::Background));
        q.push(job("i1", Priority::Interactive));
        let id = ObjectId::new("b1").unwrap();
        assert!(q.promote(&id));
        assert!(!q.promote(&id));
        assert_eq!(q.pop().await.unwrap().object_id.as_str(), "i1");
        assert_eq!(q.pop().await.unwrap().object_id.as_str(), "b1");
    }

    #[tokio::test]
    async fn waiting_workers_wake_on_push_and_close() {
        let q = Arc::new(JobQueue::new());
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let q = Arc::clone(&q);
            waiters.push(tokio::spawn(async move { q.pop().await }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(job("a", Priority::Interactive));
        q.push(job("b", Priority::Background));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(q.close().is_empty());

        let mut got = 0;
        let mut none = 0;
        for w in waiters {
            match tokio::time::timeout(Duration::from_secs(2), w).await.unwrap().unwrap() {
                Some(_) => got += 1,
                None => none += 1,
            }
        }
        assert_eq!((got, none), (2, 1));
    }

    #[tokio::test]
    async fn push_after_close_is_rejected() {
        let q = JobQueue::new();
        q.push(job("a", Priority::Background));
        let drained = q.close();
        assert_eq!(drained.len(), 1);
        assert!(!q.push(job("b", Priority::Interactive)));
        assert!(q.pop().await.is_none());
        assert_eq!(q.counts(), QueueCounts::default());
    }
}
