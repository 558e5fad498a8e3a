//! Dedup / admission gate.
//!
//! Maps each object id to at most one active job. A job is active from
//! admission until `finish` is called after the fetch failed or the relay
//! reached a terminal state. Check-and-create runs under a per-shard async
//! mutex, so requests for unrelated objects on other shards never wait on
//! each other; the catalog lookup happens inside that critical section.

mod handle;

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};

use crate::artifact::{artifact_path, file_len};
use crate::catalog::CatalogStore;
use crate::job::{JobOutcome, JobState, ObjectId, Priority};
use crate::ledger::{AlreadyActive, ProgressLedger};
use crate::pool::{FetchJob, JobQueue};

pub use handle::JobHandle;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("catalog lookup failed: {0:#}")]
    Catalog(anyhow::Error),
    #[error(transparent)]
    Busy(#[from] AlreadyActive),
    #[error("not accepting new jobs")]
    ShuttingDown,
}

/// How a submission was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    /// A new job was admitted.
    Queued,
    /// An active job already exists; the caller follows it.
    AlreadyQueued,
    /// The catalog already records a remote copy; nothing was queued.
    AlreadyUploaded,
}

impl SubmitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitStatus::Queued => "queued",
            SubmitStatus::AlreadyQueued => "already_queued",
            SubmitStatus::AlreadyUploaded => "already_uploaded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub status: SubmitStatus,
    /// Effective priority of the job the caller is attached to.
    pub priority: Priority,
    pub handle: JobHandle,
    /// Set for `AlreadyUploaded`.
    pub remote_url: Option<String>,
}

struct ActiveJob {
    priority: Priority,
    label: Option<String>,
    admitted_at: Instant,
    outcome: watch::Sender<Option<JobOutcome>>,
}

/// One row of `AdmissionGate::snapshot`.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJobInfo {
    pub object_id: ObjectId,
    pub priority: Priority,
    pub label: Option<String>,
    pub state: Option<JobState>,
    pub age_secs: u64,
}

pub struct AdmissionGate {
    shards: Vec<Mutex<HashMap<ObjectId, ActiveJob>>>,
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<ProgressLedger>,
    queue: Arc<JobQueue>,
    data_dir: PathBuf,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("shards", &self.shards.len())
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    pub fn new(
        shards: usize,
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<ProgressLedger>,
        queue: Arc<JobQueue>,
        data_dir: PathBuf,
    ) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            shards,
            catalog,
            ledger,
            queue,
            data_dir,
        }
    }

    fn shard(&self, id: &ObjectId) -> &Mutex<HashMap<ObjectId, ActiveJob>> {
        let mut h = DefaultHasher::new();
        id.hash(&mut h);
        &self.shards[(h.finish() as usize) % self.shards.len()]
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Admit `id`, attach to its active job, or short-circuit on a catalog hit.
    pub async fn submit(
        &self,
        id: &ObjectId,
        priority: Priority,
        label: Option<String>,
    ) -> Result<Submission, GateError> {
        let mut map = self.shard(id).lock().await;

        if let Some(active) = map.get_mut(id) {
            if priority == Priority::Interactive
                && active.priority == Priority::Background
                && self.queue.promote(id)
            {
                tracing::debug!(object_id = %id, "promoted queued job to interactive");
                active.priority = Priority::Interactive;
            }
            return Ok(Submission {
                status: SubmitStatus::AlreadyQueued,
                priority: active.priority,
                handle: JobHandle::new(id.clone(), active.outcome.subscribe()),
                remote_url: None,
            });
        }

        let link = self.catalog.link(id).await.map_err(GateError::Catalog)?;
        if let Some(url) = link.as_ref().and_then(|l| l.uploaded_url()) {
            let remote_url = url.to_string();
            return Ok(Submission {
                status: SubmitStatus::AlreadyUploaded,
                priority,
                handle: JobHandle::resolved(
                    id.clone(),
                    JobOutcome::Uploaded {
                        remote_url: remote_url.clone(),
                    },
                ),
                remote_url: Some(remote_url),
            });
        }

        if self.queue.is_closed() {
            return Err(GateError::ShuttingDown);
        }

        let local_path = artifact_path(&self.data_dir, id);
        let relay_only = self.completed_locally(id, &local_path).await;
        if !relay_only {
            self.ledger.begin(id, local_path.clone())?;
        }

        let job = FetchJob {
            object_id: id.clone(),
            priority,
            label: label.clone(),
            local_path,
            relay_only,
            enqueued_at: Instant::now(),
        };
        if !self.queue.push(job) {
            if !relay_only {
                self.ledger.fail(id, "shutting down");
            }
            return Err(GateError::ShuttingDown);
        }

        let (tx, rx) = watch::channel(None);
        map.insert(
            id.clone(),
            ActiveJob {
                priority,
                label: label.clone(),
                admitted_at: Instant::now(),
                outcome: tx,
            },
        );
        tracing::info!(
            object_id = %id,
            priority = priority.as_str(),
            label = label.as_deref().unwrap_or(""),
            relay_only,
            "job admitted"
        );
        Ok(Submission {
            status: SubmitStatus::Queued,
            priority,
            handle: JobHandle::new(id.clone(), rx),
            remote_url: None,
        })
    }

    /// The ledger says the last fetch completed and the artifact on disk
    /// still has the recorded size: only the relay needs to run again.
    async fn completed_locally(&self, id: &ObjectId, local_path: &std::path::Path) -> bool {
        let Some(entry) = self.ledger.get(id) else {
            return false;
        };
        if entry.state != JobState::Completed {
            return false;
        }
        let watched = self.ledger.watch(id).and_then(|w| w.local_path);
        if watched.as_deref() != Some(local_path) {
            return false;
        }
        file_len(local_path).await == Some(entry.bytes_written)
    }

    /// Retire the active job for `id` and deliver `outcome` to every caller
    /// attached to it. Returns false if no job was active.
    pub async fn finish(&self, id: &ObjectId, outcome: JobOutcome) -> bool {
        let removed = self.shard(id).lock().await.remove(id);
        match removed {
            Some(job) => {
                tracing::debug!(object_id = %id, ?outcome, "job retired");
                job.outcome.send_replace(Some(outcome));
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self, id: &ObjectId) -> bool {
        self.shard(id).lock().await.contains_key(id)
    }

    pub async fn active_count(&self) -> usize {
        let mut n = 0;
        for shard in &self.shards {
            n += shard.lock().await.len();
        }
        n
    }

    /// Active jobs, oldest first.
    pub async fn snapshot(&self) -> Vec<ActiveJobInfo> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let map = shard.lock().await;
            for (id, job) in map.iter() {
                out.push(ActiveJobInfo {
                    object_id: id.clone(),
                    priority: job.priority,
                    label: job.label.clone(),
                    state: self.ledger.get(id).map(|e| e.state),
                    age_secs: job.admitted_at.elapsed().as_secs(),
                });
            }
        }
        out.sort_by(|a, b| b.age_secs.cmp(&a.age_secs));
        out
    }
}
