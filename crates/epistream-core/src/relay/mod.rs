//! Upload relay: pushes a finished artifact to durable storage in fixed-size
//! chunks, records the public URL in the catalog and schedules the local copy
//! for deletion.
//!
//! Chunks go up with bounded concurrency; each chunk is retried with backoff
//! on its own. One chunk exhausting its attempts fails the whole relay: the
//! remaining chunks are abandoned, nothing is committed, the catalog is not
//! touched and the local file is kept so the relay can be retried.

mod chunk;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::catalog::CatalogStore;
use crate::config::RelayConfig;
use crate::gate::AdmissionGate;
use crate::job::{JobOutcome, ObjectId};
use crate::reaper::Reaper;
use crate::retry::{classify, RetryDecision, RetryPolicy, TransferError};
use crate::store::{chunk_key, ObjectStore};

pub use chunk::UploadChunk;

/// A completed artifact waiting for upload.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub object_id: ObjectId,
    pub local_path: PathBuf,
    pub label: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("storage transfer failed: chunk {index} after {attempts} attempts: {source}")]
    StorageTransferFailed {
        index: usize,
        attempts: u32,
        #[source]
        source: TransferError,
    },
    #[error("storage commit failed: {0}")]
    Commit(#[source] TransferError),
    #[error("reading local artifact: {0}")]
    Local(#[from] std::io::Error),
    #[error("catalog update failed: {0:#}")]
    Catalog(anyhow::Error),
}

#[derive(Debug, Default)]
struct RelayCounters {
    in_progress: AtomicUsize,
    uploaded: AtomicU64,
    failed: AtomicU64,
    chunks_sent: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub in_progress: usize,
    pub uploaded: u64,
    pub failed: u64,
    pub chunks_sent: u64,
}

pub struct UploadRelay {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogStore>,
    reaper: Arc<Reaper>,
    cfg: RelayConfig,
    policy: RetryPolicy,
    counters: RelayCounters,
}

impl std::fmt::Debug for UploadRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRelay")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl UploadRelay {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
        reaper: Arc<Reaper>,
        cfg: RelayConfig,
    ) -> Self {
        let policy = cfg.retry_policy();
        Self {
            store,
            catalog,
            reaper,
            cfg,
            policy,
            counters: RelayCounters::default(),
        }
    }

    pub fn status(&self) -> RelayStatus {
        let c = &self.counters;
        RelayStatus {
            in_progress: c.in_progress.load(Ordering::Relaxed),
            uploaded: c.uploaded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            chunks_sent: c.chunks_sent.load(Ordering::Relaxed),
        }
    }

    /// Upload `local_path` as `id` and return its public URL.
    ///
    /// Idempotent: if the catalog already records a remote URL for `id`, that
    /// URL is returned and nothing is uploaded.
    pub async fn relay(&self, local_path: &Path, id: &ObjectId) -> Result<String, RelayError> {
        if let Some(url) = self
            .catalog
            .link(id)
            .await
            .map_err(RelayError::Catalog)?
            .and_then(|l| l.uploaded_url().map(str::to_string))
        {
            tracing::debug!(object_id = %id, "already uploaded; skipping relay");
            return Ok(url);
        }

        self.counters.in_progress.fetch_add(1, Ordering::Relaxed);
        let res = self.upload(local_path, id).await;
        self.counters.in_progress.fetch_sub(1, Ordering::Relaxed);
        let url = match res {
            Ok(url) => url,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        self.catalog
            .mark_downloaded(id, &url)
            .await
            .map_err(RelayError::Catalog)?;
        self.counters.uploaded.fetch_add(1, Ordering::Relaxed);
        // Only after the URL is durable.
        self.reaper.schedule(
            id,
            local_path.to_path_buf(),
            Duration::from_secs(self.cfg.local_grace_secs),
        );
        Ok(url)
    }

    async fn upload(&self, local_path: &Path, id: &ObjectId) -> Result<String, RelayError> {
        let len = tokio::fs::metadata(local_path).await?.len();
        let chunks = chunk::plan(id, len, self.cfg.chunk_size_bytes);
        let count = chunks.len();
        let keys: Vec<String> = (0..count).map(|i| chunk_key(id, i)).collect();
        tracing::info!(object_id = %id, bytes = len, chunks = count, "relay started");

        let max_in_flight = self.cfg.max_concurrent_chunks.max(1);
        let chunk_timeout = Duration::from_secs(self.cfg.chunk_timeout_secs.max(1));
        let mut waiting: Vec<UploadChunk> = chunks;
        waiting.reverse();
        let mut in_flight: JoinSet<(UploadChunk, Result<(), TransferError>)> = JoinSet::new();

        loop {
            let now = Instant::now();
            while in_flight.len() < max_in_flight {
                let Some(pos) = waiting.iter().rposition(|c| c.not_before <= now) else {
                    break;
                };
                let chunk = waiting.remove(pos);
                let store = Arc::clone(&self.store);
                let path = local_path.to_path_buf();
                let key = keys[chunk.sequence_index].clone();
                in_flight.spawn(async move {
                    let res = chunk::send(store.as_ref(), &path, &key, &chunk, chunk_timeout).await;
                    (chunk, res)
                });
            }

            if in_flight.is_empty() {
                let Some(due) = waiting.iter().map(|c| c.not_before).min() else {
                    break;
                };
                tokio::time::sleep_until(due).await;
                continue;
            }

            let next_due = waiting.iter().map(|c| c.not_before).min();
            let joined = match next_due {
                Some(due) => tokio::select! {
                    j = in_flight.join_next() => j,
                    _ = tokio::time::sleep_until(due) => continue,
                },
                None => in_flight.join_next().await,
            };
            let Some(joined) = joined else {
                continue;
            };
            let (mut chunk, res) = joined.map_err(|e| {
                RelayError::Local(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;

            match res {
                Ok(()) => {
                    self.counters.chunks_sent.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(object_id = %id, chunk = chunk.sequence_index, attempt = chunk.attempt_count, "chunk stored");
                }
                Err(e) => match self.policy.decide(chunk.attempt_count, classify(&e)) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(object_id = %id, chunk = chunk.sequence_index, attempt = chunk.attempt_count, ?delay, "chunk upload failed: {}; retrying", e);
                        chunk.attempt_count += 1;
                        chunk.not_before = Instant::now() + delay;
                        waiting.push(chunk);
                    }
                    RetryDecision::NoRetry => {
                        in_flight.abort_all();
                        tracing::warn!(object_id = %id, chunk = chunk.sequence_index, attempts = chunk.attempt_count, "chunk upload gave up: {}", e);
                        return Err(RelayError::StorageTransferFailed {
                            index: chunk.sequence_index,
                            attempts: chunk.attempt_count,
                            source: e,
                        });
                    }
                },
            }
        }

        let url = self.store.commit(id, &keys).await.map_err(RelayError::Commit)?;
        tracing::info!(object_id = %id, %url, "relay committed");
        Ok(url)
    }
}

/// Consume relay requests until the channel closes, retiring each job in the
/// gate with its final outcome.
pub async fn run_relay_loop(
    relay: Arc<UploadRelay>,
    mut rx: mpsc::Receiver<RelayRequest>,
    gate: Arc<AdmissionGate>,
) {
    while let Some(req) = rx.recv().await {
        let id = &req.object_id;
        let outcome = match relay.relay(&req.local_path, id).await {
            Ok(remote_url) => JobOutcome::Uploaded { remote_url },
            Err(e) => {
                tracing::warn!(object_id = %id, label = req.label.as_deref().unwrap_or(""), "relay failed, local copy kept: {}", e);
                relay.reaper.cancel(id);
                JobOutcome::FetchedOnly {
                    error: e.to_string(),
                }
            }
        };
        gate.finish(id, outcome).await;
    }
    tracing::debug!("relay loop stopped");
}
