//! One worker: pop a job, fetch it with retry, hand it to the relay.

use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::queue::{FetchJob, JobQueue};
use super::FetchContext;
use crate::artifact::{sha256_file, ArtifactWriter};
use crate::job::{JobOutcome, JobState, ObjectId};
use crate::relay::RelayRequest;
use crate::retry::{run_with_retry, TransferError};
use crate::source::SourceStream;

/// Terminal fetch failure.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The source kept failing (or said the object doesn't exist).
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] TransferError),
    /// Writing the artifact failed. Not retried.
    #[error("local storage: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<TransferError> for FetchError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Storage(io) => FetchError::Storage(io),
            other => FetchError::SourceUnavailable(other),
        }
    }
}

const UNKNOWN: u64 = u64::MAX;

/// Bytes persisted so far, shared across attempts of one job.
struct FetchCursor {
    written: AtomicU64,
    total: AtomicU64,
}

impl FetchCursor {
    fn new() -> Self {
        Self {
            written: AtomicU64::new(0),
            total: AtomicU64::new(UNKNOWN),
        }
    }

    fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    fn advance_to(&self, pos: u64) {
        self.written.fetch_max(pos, Ordering::AcqRel);
    }

    fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Acquire) {
            UNKNOWN => None,
            t => Some(t),
        }
    }

    /// Returns true the first time a total is learned.
    fn learn_total(&self, total: u64) -> bool {
        self.total
            .compare_exchange(UNKNOWN, total, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

pub(super) async fn worker_loop(worker: usize, queue: Arc<JobQueue>, ctx: FetchContext) {
    tracing::debug!(worker, "fetch worker started");
    while let Some(job) = queue.pop().await {
        let id = job.object_id.clone();
        ctx.stats.started();
        let res = AssertUnwindSafe(run_job(&ctx, job)).catch_unwind().await;
        ctx.stats.finished();
        if res.is_err() {
            // The job is failed, not the worker.
            tracing::error!(worker, object_id = %id, "fetch job panicked");
            ctx.ledger.fail(&id, "internal error");
            ctx.stats.record_failed();
            ctx.gate
                .finish(
                    &id,
                    JobOutcome::Failed {
                        error: "internal error".into(),
                    },
                )
                .await;
        }
    }
    tracing::debug!(worker, "fetch worker exiting");
}

async fn run_job(ctx: &FetchContext, job: FetchJob) {
    let id = &job.object_id;
    let label = job.label.as_deref().unwrap_or("");
    if job.relay_only {
        tracing::info!(object_id = %id, label, "artifact already complete; relaying");
        hand_to_relay(ctx, job).await;
        return;
    }

    let waited = job.enqueued_at.elapsed();
    let started = Instant::now();
    tracing::info!(object_id = %id, label, priority = job.priority.as_str(), ?waited, "fetch started");

    match fetch_object(ctx, &job).await {
        Ok(len) => {
            ctx.ledger.set(id, len, Some(len), JobState::Completed);
            ctx.stats.record_completed();
            tracing::info!(object_id = %id, label, bytes = len, elapsed = ?started.elapsed(), "fetch completed");
            match sha256_file(job.local_path.clone()).await {
                Ok(sum) => {
                    if let Err(e) = ctx.catalog.record_checksum(id, &sum).await {
                        tracing::warn!(object_id = %id, "recording checksum failed: {:#}", e);
                    }
                }
                Err(e) => tracing::warn!(object_id = %id, "checksum failed: {:#}", e),
            }
            hand_to_relay(ctx, job).await;
        }
        Err(e) => {
            let error = e.to_string();
            tracing::warn!(object_id = %id, label, "fetch failed: {}", error);
            ctx.ledger.fail(id, error.clone());
            ctx.stats.record_failed();
            ctx.gate.finish(id, JobOutcome::Failed { error }).await;
        }
    }
}

async fn hand_to_relay(ctx: &FetchContext, job: FetchJob) {
    let id = job.object_id.clone();
    let req = RelayRequest {
        object_id: job.object_id,
        local_path: job.local_path,
        label: job.label,
    };
    if ctx.relay_tx.send(req).await.is_err() {
        tracing::warn!(object_id = %id, "relay stopped; keeping local copy");
        ctx.gate
            .finish(
                &id,
                JobOutcome::FetchedOnly {
                    error: "relay not running".into(),
                },
            )
            .await;
    }
}

/// Fetch the object into its artifact. Returns the final length.
async fn fetch_object(ctx: &FetchContext, job: &FetchJob) -> Result<u64, FetchError> {
    let id = &job.object_id;
    ctx.ledger.set(id, 0, None, JobState::Fetching);
    if let Some(parent) = job.local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let writer = ArtifactWriter::create(&job.local_path)?;
    let cursor = FetchCursor::new();
    let attempt_timeout = Duration::from_secs(ctx.fetch.attempt_timeout_secs.max(1));

    run_with_retry(&ctx.retry, attempt_timeout, "fetch attempt", |attempt| {
        attempt_once(ctx, id, &writer, &cursor, attempt)
    })
    .await?;

    let len = cursor.written();
    writer.finish(len).await?;
    Ok(len)
}

fn publish(ctx: &FetchContext, id: &ObjectId, cursor: &FetchCursor) {
    ctx.ledger
        .set(id, cursor.written(), cursor.total(), JobState::Fetching);
}

async fn attempt_once(
    ctx: &FetchContext,
    id: &ObjectId,
    writer: &ArtifactWriter,
    cursor: &FetchCursor,
    attempt: u32,
) -> Result<(), TransferError> {
    let offset = cursor.written();
    if attempt > 1 {
        // The previous attempt may have been cut off by its timeout.
        publish(ctx, id, cursor);
    }
    tracing::debug!(object_id = %id, attempt, offset, "fetch attempt");

    let stream = ctx.source.open(id, offset).await?;
    if let Some(total) = stream.total_len {
        if cursor.learn_total(total) && total > 0 {
            writer.preallocate(total)?;
        }
    }
    if stream.start_offset > offset {
        return Err(TransferError::Connection(format!(
            "source resumed at {} past persisted offset {}",
            stream.start_offset, offset
        )));
    }

    let copied = copy_body(ctx, id, writer, cursor, stream).await;
    publish(ctx, id, cursor);
    copied?;

    match cursor.total() {
        Some(total) if cursor.written() < total => Err(TransferError::PartialTransfer {
            expected: total,
            received: cursor.written(),
        }),
        _ => Ok(()),
    }
}

/// Copy the body into the artifact. Bytes before the persisted offset (a
/// source that restarted from an earlier position) are skipped.
async fn copy_body(
    ctx: &FetchContext,
    id: &ObjectId,
    writer: &ArtifactWriter,
    cursor: &FetchCursor,
    stream: SourceStream,
) -> Result<(), TransferError> {
    let SourceStream {
        start_offset,
        mut body,
        ..
    } = stream;
    let idle = Duration::from_secs(ctx.fetch.idle_timeout_secs.max(1));
    let flush_bytes = ctx.fetch.progress_flush_bytes.max(1);
    let flush_every = Duration::from_millis(ctx.fetch.progress_interval_ms);

    let mut pos = start_offset;
    let mut flushed_at = cursor.written();
    let mut last_flush = Instant::now();

    loop {
        let next = tokio::time::timeout(idle, body.next())
            .await
            .map_err(|_| TransferError::TimedOut {
                what: "source idle",
                after: idle,
            })?;
        let Some(chunk) = next else {
            return Ok(());
        };
        let mut chunk: Bytes = chunk?;

        let persisted = cursor.written();
        let end = pos + chunk.len() as u64;
        if end <= persisted {
            pos = end;
            continue;
        }
        if pos < persisted {
            chunk = chunk.slice((persisted - pos) as usize..);
            pos = persisted;
        }

        let len = chunk.len() as u64;
        writer.write_at(pos, chunk).await?;
        pos += len;
        cursor.advance_to(pos);
        ctx.stats.add_bytes(len);

        if pos - flushed_at >= flush_bytes || last_flush.elapsed() >= flush_every {
            publish(ctx, id, cursor);
            flushed_at = pos;
            last_flush = Instant::now();
        }
    }
}
