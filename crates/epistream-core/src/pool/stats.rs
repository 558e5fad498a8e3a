//! Pool counters for `/status`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::queue::QueueCounts;

#[derive(Debug, Default)]
pub struct PoolStats {
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    bytes_fetched: AtomicU64,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub workers: usize,
    pub queued: QueueCounts,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub bytes_fetched: u64,
}

impl PoolStats {
    pub(super) fn started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(super) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn add_bytes(&self, n: u64) {
        self.bytes_fetched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn status(&self, queued: QueueCounts, workers: usize) -> PoolStatus {
        PoolStatus {
            workers,
            queued,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
        }
    }
}
