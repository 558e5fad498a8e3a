//! In-memory progress ledger.
//!
//! One record per object id, sharded behind `RwLock`s with O(1) critical
//! sections: many stream readers and progress pollers, one writer (the fetch
//! worker owning the job). Records outlive their jobs so late progress
//! queries still resolve, until evicted by the retention policy.

mod entry;
mod retention;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use tokio::sync::Notify;

use crate::job::{JobState, ObjectId};

pub use entry::ProgressEntry;
pub use retention::RetentionPolicy;

/// Error from `begin` when a job generation is still running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("object {0} already has an active job")]
pub struct AlreadyActive(pub ObjectId);

struct Record {
    entry: ProgressEntry,
    local_path: Option<PathBuf>,
    notify: Arc<Notify>,
}

/// Handle a stream reader keeps while following a growing file.
#[derive(Clone)]
pub struct LedgerWatch {
    pub local_path: Option<PathBuf>,
    pub notify: Arc<Notify>,
}

pub struct ProgressLedger {
    shards: Vec<RwLock<HashMap<ObjectId, Record>>>,
}

impl std::fmt::Debug for ProgressLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressLedger")
            .field("shards", &self.shards.len())
            .field("entries", &self.len())
            .finish()
    }
}

impl Default for ProgressLedger {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ProgressLedger {
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards }
    }

    fn shard(&self, id: &ObjectId) -> &RwLock<HashMap<ObjectId, Record>> {
        let mut h = DefaultHasher::new();
        id.hash(&mut h);
        &self.shards[(h.finish() as usize) % self.shards.len()]
    }

    fn read(&self, id: &ObjectId) -> RwLockReadGuard<'_, HashMap<ObjectId, Record>> {
        self.shard(id).read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, id: &ObjectId) -> RwLockWriteGuard<'_, HashMap<ObjectId, Record>> {
        self.shard(id).write().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new job generation for `id` in state `Queued`.
    ///
    /// Fails if the current record is still queued or fetching. A terminal
    /// record is replaced; its notifier is kept so existing waiters wake up.
    pub fn begin(&self, id: &ObjectId, local_path: PathBuf) -> Result<(), AlreadyActive> {
        let mut map = self.write(id);
        let notify = match map.get(id) {
            Some(r) if !r.entry.state.is_terminal() => return Err(AlreadyActive(id.clone())),
            Some(r) => Arc::clone(&r.notify),
            None => Arc::new(Notify::new()),
        };
        map.insert(
            id.clone(),
            Record {
                entry: ProgressEntry::queued(),
                local_path: Some(local_path),
                notify: Arc::clone(&notify),
            },
        );
        drop(map);
        notify.notify_waiters();
        Ok(())
    }

    /// Record progress. Returns false (and changes nothing) when `id` is
    /// unknown or `state` would move the record backwards.
    ///
    /// `bytes_written` never decreases; a known total is never forgotten.
    /// On `Completed` the total is pinned to the bytes written.
    pub fn set(
        &self,
        id: &ObjectId,
        bytes_written: u64,
        bytes_total: Option<u64>,
        state: JobState,
    ) -> bool {
        let notify = {
            let mut map = self.write(id);
            let Some(rec) = map.get_mut(id) else {
                return false;
            };
            let e = &mut rec.entry;
            if !e.state.can_advance_to(state) {
                return false;
            }
            if e.state.is_terminal() {
                return false;
            }
            e.bytes_written = e.bytes_written.max(bytes_written);
            if bytes_total.is_some() {
                e.bytes_total = bytes_total;
            }
            if state == JobState::Completed {
                e.bytes_total = Some(e.bytes_written);
            }
            e.state = state;
            e.updated_at = SystemTime::now();
            Arc::clone(&rec.notify)
        };
        notify.notify_waiters();
        true
    }

    /// Mark the job failed with a terminal error.
    pub fn fail(&self, id: &ObjectId, error: impl Into<String>) -> bool {
        let notify = {
            let mut map = self.write(id);
            let Some(rec) = map.get_mut(id) else {
                return false;
            };
            if rec.entry.state.is_terminal() {
                return false;
            }
            rec.entry.state = JobState::Failed;
            rec.entry.error = Some(error.into());
            rec.entry.updated_at = SystemTime::now();
            Arc::clone(&rec.notify)
        };
        notify.notify_waiters();
        true
    }

    pub fn get(&self, id: &ObjectId) -> Option<ProgressEntry> {
        self.read(id).get(id).map(|r| r.entry.clone())
    }

    /// Local artifact path and change notifier for `id`.
    pub fn watch(&self, id: &ObjectId) -> Option<LedgerWatch> {
        self.read(id).get(id).map(|r| LedgerWatch {
            local_path: r.local_path.clone(),
            notify: Arc::clone(&r.notify),
        })
    }

    /// Drop the local path once the reaper deleted the file.
    pub fn forget_local_path(&self, id: &ObjectId) {
        if let Some(rec) = self.write(id).get_mut(id) {
            rec.local_path = None;
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the retention policy; returns how many records were dropped.
    /// Queued or fetching records are never evicted.
    pub fn evict(&self, policy: &RetentionPolicy, now: SystemTime) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut map = shard.write().unwrap_or_else(|e| e.into_inner());
            let before = map.len();
            map.retain(|_, r| !policy.expired(&r.entry, now));
            removed += before - map.len();
        }

        let total = self.len();
        if total <= policy.max_entries {
            return removed;
        }
        let mut terminal: Vec<(SystemTime, ObjectId)> = Vec::new();
        for shard in &self.shards {
            let map = shard.read().unwrap_or_else(|e| e.into_inner());
            terminal.extend(
                map.iter()
                    .filter(|(_, r)| r.entry.state.is_terminal())
                    .map(|(id, r)| (r.entry.updated_at, id.clone())),
            );
        }
        terminal.sort();
        for (_, id) in terminal.into_iter().take(total - policy.max_entries) {
            let mut map = self.write(&id);
            if map.get(&id).is_some_and(|r| r.entry.state.is_terminal()) {
                map.remove(&id);
                removed += 1;
            }
        }
        removed
    }
}
