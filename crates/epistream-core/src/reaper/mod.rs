//! Deferred deletion of relayed artifacts and ledger retention.
//!
//! The relay schedules a local file for deletion once its remote URL is
//! durable; the file stays around for the grace period so streams that are
//! already reading it can finish. A periodic sweep (and `POST /cleanup`)
//! removes due files and evicts old ledger records.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::catalog::CatalogStore;
use crate::job::ObjectId;
use crate::ledger::{ProgressLedger, RetentionPolicy};

#[derive(Debug)]
struct PendingDeletion {
    path: PathBuf,
    due: Instant,
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub files_removed: usize,
    pub entries_evicted: usize,
}

#[derive(Debug)]
pub struct Reaper {
    pending: Mutex<HashMap<ObjectId, PendingDeletion>>,
    ledger: Arc<ProgressLedger>,
    retention: RetentionPolicy,
}

impl Reaper {
    pub fn new(ledger: Arc<ProgressLedger>, retention: RetentionPolicy) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ledger,
            retention,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectId, PendingDeletion>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delete `path` once `grace` has passed. Rescheduling replaces the
    /// previous deadline.
    pub fn schedule(&self, id: &ObjectId, path: PathBuf, grace: Duration) {
        tracing::debug!(object_id = %id, ?grace, "local copy scheduled for deletion");
        self.lock().insert(
            id.clone(),
            PendingDeletion {
                path,
                due: Instant::now() + grace,
            },
        );
    }

    /// Keep the local copy after all (e.g. the relay failed).
    pub fn cancel(&self, id: &ObjectId) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Remove due files and apply ledger retention now.
    pub async fn sweep_now(&self) -> SweepReport {
        let now = Instant::now();
        let due: Vec<(ObjectId, PathBuf)> = {
            let mut pending = self.lock();
            let ids: Vec<ObjectId> = pending
                .iter()
                .filter(|(id, p)| {
                    // Never pull a file out from under a running fetch.
                    p.due <= now && !self.ledger.get(id).is_some_and(|e| e.is_active())
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|p| (id, p.path)))
                .collect()
        };

        let mut report = SweepReport::default();
        for (id, path) in due {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report.files_removed += 1;
                    tracing::info!(object_id = %id, path = %path.display(), "local copy removed");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(object_id = %id, path = %path.display(), "removing local copy failed: {}", e);
                    continue;
                }
            }
            self.ledger.forget_local_path(&id);
        }
        report.entries_evicted = self.ledger.evict(&self.retention, SystemTime::now());
        if report != SweepReport::default() {
            tracing::info!(
                files_removed = report.files_removed,
                entries_evicted = report.entries_evicted,
                "sweep finished"
            );
        }
        report
    }

    /// Sweep every `interval` until the returned task is aborted.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let reaper = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                reaper.sweep_now().await;
            }
        })
    }
}

/// Offline sweep of a data directory (no server running): delete artifacts
/// the catalog records as uploaded and that were last written more than
/// `min_age` ago. Returns how many files were removed.
pub async fn sweep_data_dir(
    data_dir: &Path,
    catalog: &dyn CatalogStore,
    min_age: Duration,
) -> anyhow::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(data_dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let now = SystemTime::now();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(ObjectId::from_file_name) else {
            continue;
        };
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < min_age {
            continue;
        }
        let uploaded = catalog
            .link(&id)
            .await?
            .is_some_and(|l| l.uploaded_url().is_some());
        if !uploaded {
            continue;
        }
        tokio::fs::remove_file(entry.path()).await?;
        tracing::info!(object_id = %id, "removed uploaded artifact");
        removed += 1;
    }
    Ok(removed)
}
