//! Fetch worker pool.
//!
//! A fixed number of long-lived workers pull jobs off the two-tier
//! `JobQueue` and drive each fetch to a terminal state, writing bytes to the
//! job's artifact and publishing progress to the ledger. Completed artifacts
//! are handed to the upload relay over a channel. A supervisor task owns the
//! workers and respawns any that die.

mod queue;
mod stats;
mod worker;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::catalog::CatalogStore;
use crate::config::FetchConfig;
use crate::gate::AdmissionGate;
use crate::job::JobOutcome;
use crate::ledger::ProgressLedger;
use crate::relay::RelayRequest;
use crate::retry::RetryPolicy;
use crate::source::ContentSource;

pub use queue::{FetchJob, JobQueue, QueueCounts};
pub use stats::{PoolStats, PoolStatus};
pub use worker::FetchError;

/// Everything a worker needs to run a job.
#[derive(Clone)]
pub struct FetchContext {
    pub ledger: Arc<ProgressLedger>,
    pub gate: Arc<AdmissionGate>,
    pub source: Arc<dyn ContentSource>,
    pub catalog: Arc<dyn CatalogStore>,
    pub relay_tx: mpsc::Sender<RelayRequest>,
    pub retry: RetryPolicy,
    pub fetch: FetchConfig,
    pub stats: Arc<PoolStats>,
}

pub struct FetchPool {
    queue: Arc<JobQueue>,
    ledger: Arc<ProgressLedger>,
    gate: Arc<AdmissionGate>,
    stats: Arc<PoolStats>,
    workers: usize,
    supervisor: JoinHandle<()>,
}

impl std::fmt::Debug for FetchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPool")
            .field("workers", &self.workers)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl FetchPool {
    /// Spawn `workers` workers consuming `queue`.
    pub fn spawn(queue: Arc<JobQueue>, ctx: FetchContext, workers: usize) -> Self {
        let workers = workers.max(1);
        let ledger = Arc::clone(&ctx.ledger);
        let gate = Arc::clone(&ctx.gate);
        let stats = Arc::clone(&ctx.stats);
        let supervisor = tokio::spawn(supervise(Arc::clone(&queue), ctx, workers));
        tracing::info!(workers, "fetch pool started");
        Self {
            queue,
            ledger,
            gate,
            stats,
            workers,
            supervisor,
        }
    }

    pub fn status(&self) -> PoolStatus {
        self.stats.status(self.queue.counts(), self.workers)
    }

    /// Stop taking jobs. Jobs still waiting in the queue fail with
    /// "shutting down"; in-flight fetches get `grace` to finish before the
    /// workers are aborted.
    pub async fn shutdown(self, grace: Duration) {
        for job in self.queue.close() {
            let error = "shutting down".to_string();
            if !job.relay_only {
                self.ledger.fail(&job.object_id, error.clone());
            }
            self.gate
                .finish(&job.object_id, JobOutcome::Failed { error })
                .await;
        }
        let mut supervisor = self.supervisor;
        if tokio::time::timeout(grace, &mut supervisor).await.is_err() {
            tracing::warn!(?grace, "fetch workers still busy; aborting");
            supervisor.abort();
        }
    }
}

async fn supervise(queue: Arc<JobQueue>, ctx: FetchContext, workers: usize) {
    let mut set = JoinSet::new();
    for n in 0..workers {
        set.spawn(worker::worker_loop(n, Arc::clone(&queue), ctx.clone()));
    }
    let mut next_id = workers;
    while let Some(res) = set.join_next().await {
        match res {
            Ok(()) => {}
            Err(e) if e.is_panic() && !queue.is_closed() => {
                tracing::error!("fetch worker died: {}; respawning", e);
                set.spawn(worker::worker_loop(next_id, Arc::clone(&queue), ctx.clone()));
                next_id += 1;
            }
            Err(e) => tracing::warn!("fetch worker ended: {}", e),
        }
    }
    tracing::debug!("fetch pool stopped");
}
