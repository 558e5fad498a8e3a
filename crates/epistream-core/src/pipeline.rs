//! Wires ledger, gate, pool, stream server, relay and reaper together and
//! owns their background tasks.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::catalog::CatalogStore;
use crate::config::EpiConfig;
use crate::gate::{ActiveJobInfo, AdmissionGate, GateError, Submission, SubmitStatus};
use crate::job::{ObjectId, Priority};
use crate::ledger::{ProgressEntry, ProgressLedger, RetentionPolicy};
use crate::pool::{FetchContext, FetchPool, JobQueue, PoolStatus, PoolStats};
use crate::reaper::{Reaper, SweepReport};
use crate::relay::{run_relay_loop, RelayStatus, UploadRelay};
use crate::source::ContentSource;
use crate::store::ObjectStore;
use crate::stream::StreamServer;

const RELAY_QUEUE_DEPTH: usize = 64;

/// Progress as reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub object_id: ObjectId,
    /// True while a fetch is queued or running; false once it ended or when
    /// nothing is known about the object.
    pub downloading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(flatten)]
    pub entry: Option<ProgressEntry>,
    /// `percentage >= min_buffer_percent`.
    pub playable: bool,
}

/// Outcome of a season bulk submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeasonSubmission {
    Queued { queued_count: usize },
    AlreadyDownloaded,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub pool: PoolStatus,
    pub relay: RelayStatus,
    pub active_jobs: Vec<ActiveJobInfo>,
    pub ledger_entries: usize,
    pub pending_deletions: usize,
}

struct Tasks {
    pool: FetchPool,
    relay: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

pub struct Pipeline {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<ProgressLedger>,
    gate: Arc<AdmissionGate>,
    streams: StreamServer,
    relay: Arc<UploadRelay>,
    reaper: Arc<Reaper>,
    stats: Arc<PoolStats>,
    queue: Arc<JobQueue>,
    workers: usize,
    min_buffer_percent: f64,
    tasks: Mutex<Option<Tasks>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("workers", &self.workers)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build every component from `cfg` and start the worker, relay and
    /// reaper tasks. Must be called inside a tokio runtime.
    pub async fn start(
        cfg: &EpiConfig,
        source: Arc<dyn ContentSource>,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Result<Arc<Self>> {
        let data_dir = cfg.resolve_data_dir()?;
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("create data dir {}", data_dir.display()))?;

        let ledger = Arc::new(ProgressLedger::new(cfg.ledger.shards));
        let queue = Arc::new(JobQueue::new());
        let gate = Arc::new(AdmissionGate::new(
            cfg.gate_shards,
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&queue),
            data_dir.clone(),
        ));
        let reaper = Arc::new(Reaper::new(
            Arc::clone(&ledger),
            RetentionPolicy::from(&cfg.ledger),
        ));
        let relay = Arc::new(UploadRelay::new(
            store,
            Arc::clone(&catalog),
            Arc::clone(&reaper),
            cfg.relay.clone(),
        ));
        let stats = Arc::new(PoolStats::default());

        let (relay_tx, relay_rx) = mpsc::channel(RELAY_QUEUE_DEPTH);
        let relay_task = tokio::spawn(run_relay_loop(
            Arc::clone(&relay),
            relay_rx,
            Arc::clone(&gate),
        ));
        let ctx = FetchContext {
            ledger: Arc::clone(&ledger),
            gate: Arc::clone(&gate),
            source,
            catalog: Arc::clone(&catalog),
            relay_tx,
            retry: cfg.fetch_retry_policy(),
            fetch: cfg.fetch.clone(),
            stats: Arc::clone(&stats),
        };
        let pool = FetchPool::spawn(Arc::clone(&queue), ctx, cfg.fetch_workers);
        let reaper_task =
            reaper.spawn_periodic(Duration::from_secs(cfg.ledger.sweep_interval_secs));

        tracing::info!(data_dir = %data_dir.display(), workers = cfg.fetch_workers, "pipeline started");
        Ok(Arc::new(Self {
            catalog,
            streams: StreamServer::new(Arc::clone(&ledger), cfg.stream.clone()),
            ledger,
            gate,
            relay,
            reaper,
            stats,
            queue,
            workers: cfg.fetch_workers.max(1),
            min_buffer_percent: cfg.min_buffer_percent,
            tasks: Mutex::new(Some(Tasks {
                pool,
                relay: relay_task,
                reaper: reaper_task,
            })),
        }))
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<ProgressLedger> {
        &self.ledger
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn streams(&self) -> &StreamServer {
        &self.streams
    }

    pub async fn submit(
        &self,
        id: &ObjectId,
        priority: Priority,
        label: Option<String>,
    ) -> Result<Submission, GateError> {
        self.gate.submit(id, priority, label).await
    }

    /// Submit every not-yet-downloaded episode of a season at background
    /// priority. `Ok(None)` if the season is unknown.
    ///
    /// Dropping the returned future stops further submissions; jobs already
    /// admitted keep running.
    pub async fn submit_season(&self, series: &str, season: &str) -> Result<Option<SeasonSubmission>> {
        let Some(episodes) = self.catalog.list_episodes(series, season).await? else {
            return Ok(None);
        };
        let mut queued_count = 0;
        for ep in episodes.iter().filter(|e| !e.downloaded) {
            let label = format!("{series} / {season} / E{}", ep.episode);
            let sub = self
                .gate
                .submit(&ep.object_id, Priority::Background, Some(label))
                .await?;
            if sub.status != SubmitStatus::AlreadyUploaded {
                queued_count += 1;
            }
        }
        tracing::info!(%series, %season, episodes = episodes.len(), queued_count, "season submitted");
        Ok(Some(if queued_count == 0 {
            SeasonSubmission::AlreadyDownloaded
        } else {
            SeasonSubmission::Queued { queued_count }
        }))
    }

    pub fn progress(&self, id: &ObjectId) -> ProgressReport {
        let entry = self.ledger.get(id);
        let percentage = entry.as_ref().and_then(ProgressEntry::percentage);
        ProgressReport {
            object_id: id.clone(),
            downloading: entry.as_ref().is_some_and(ProgressEntry::is_active),
            percentage,
            playable: percentage.is_some_and(|p| p >= self.min_buffer_percent),
            entry,
        }
    }

    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            pool: self.stats.status(self.queue.counts(), self.workers),
            relay: self.relay.status(),
            active_jobs: self.gate.snapshot().await,
            ledger_entries: self.ledger.len(),
            pending_deletions: self.reaper.pending(),
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.reaper.sweep_now().await
    }

    /// Stop accepting jobs and wind the background tasks down. Fetches still
    /// running after `grace` are aborted; queued relays are finished first.
    pub async fn shutdown(&self, grace: Duration) {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(tasks) = tasks else {
            return;
        };
        tracing::info!("pipeline shutting down");
        tasks.reaper.abort();
        // Dropping the pool's context closes the relay channel once the
        // workers are gone, which ends the relay loop.
        tasks.pool.shutdown(grace).await;
        let mut relay = tasks.relay;
        if tokio::time::timeout(grace, &mut relay).await.is_err() {
            tracing::warn!("relay still busy; aborting");
            relay.abort();
        }
    }
}
