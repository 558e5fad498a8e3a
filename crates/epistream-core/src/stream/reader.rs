//! Follows one ledger record and reads the artifact as it grows.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::StreamError;
use crate::config::StreamConfig;
use crate::job::{JobState, ObjectId};
use crate::ledger::{ProgressEntry, ProgressLedger};

pub(super) struct Follower {
    ledger: Arc<ProgressLedger>,
    id: ObjectId,
    notify: Arc<Notify>,
    path: PathBuf,
    file: Option<tokio::fs::File>,
    poll: Duration,
    stall: Duration,
    read_chunk: u64,
    last_progress: Instant,
    seen_written: u64,
}

impl Follower {
    pub fn new(ledger: Arc<ProgressLedger>, id: ObjectId, cfg: &StreamConfig) -> Result<Self, StreamError> {
        let watch = ledger.watch(&id).ok_or_else(|| StreamError::NotFound(id.clone()))?;
        let path = watch.local_path.ok_or_else(|| StreamError::NotFound(id.clone()))?;
        Ok(Self {
            ledger,
            id,
            notify: watch.notify,
            path,
            file: None,
            poll: Duration::from_millis(cfg.poll_ms.max(1)),
            stall: Duration::from_secs(cfg.stall_secs.max(1)),
            read_chunk: cfg.read_chunk_bytes.max(1) as u64,
            last_progress: Instant::now(),
            seen_written: 0,
        })
    }

    fn entry(&self) -> Result<ProgressEntry, StreamError> {
        self.ledger
            .get(&self.id)
            .ok_or_else(|| StreamError::NotFound(self.id.clone()))
    }

    /// Wait for a change notification (or the poll interval). Errors with
    /// `Stalled` when a fetching job hasn't moved `bytes_written` for the
    /// stall period. A job still waiting for a worker never stalls.
    async fn wait_for_change(&mut self, notified: std::pin::Pin<&mut tokio::sync::futures::Notified<'_>>, entry: &ProgressEntry) -> Result<(), StreamError> {
        let written = entry.bytes_written;
        if written > self.seen_written || entry.state == JobState::Queued {
            self.seen_written = self.seen_written.max(written);
            self.last_progress = Instant::now();
        }
        if self.last_progress.elapsed() >= self.stall {
            tracing::warn!(object_id = %self.id, written, "stream stalled");
            return Err(StreamError::Stalled(self.stall));
        }
        let _ = tokio::time::timeout(self.poll, notified).await;
        Ok(())
    }

    /// Block until the object length is known.
    pub async fn wait_for_total(&mut self) -> Result<u64, StreamError> {
        let notify = Arc::clone(&self.notify);
        loop {
            let mut notified = std::pin::pin!(notify.notified());
            notified.as_mut().enable();
            let entry = self.entry()?;
            if entry.state == JobState::Failed {
                return Err(StreamError::SourceUnavailable(
                    entry.error.unwrap_or_else(|| "fetch failed".into()),
                ));
            }
            if let Some(total) = entry.bytes_total {
                return Ok(total);
            }
            self.wait_for_change(notified, &entry).await?;
        }
    }

    async fn read_at(&mut self, offset: u64, len: u64) -> Result<Bytes, StreamError> {
        if self.file.is_none() {
            self.file = Some(tokio::fs::File::open(&self.path).await?);
        }
        let Some(file) = self.file.as_mut() else {
            return Err(StreamError::NotFound(self.id.clone()));
        };
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Next piece of `[pos, end)`, waiting for the fetch as needed.
    async fn next_chunk(&mut self, pos: u64, end: u64) -> Result<Bytes, StreamError> {
        let notify = Arc::clone(&self.notify);
        loop {
            let mut notified = std::pin::pin!(notify.notified());
            notified.as_mut().enable();
            let entry = self.entry()?;
            let available = entry.bytes_written.min(end);
            if available > pos {
                let len = (available - pos).min(self.read_chunk);
                let bytes = self.read_at(pos, len).await?;
                self.last_progress = Instant::now();
                return Ok(bytes);
            }
            match entry.state {
                JobState::Failed => {
                    return Err(StreamError::SourceUnavailable(
                        entry.error.unwrap_or_else(|| "fetch failed".into()),
                    ))
                }
                JobState::Completed => {
                    return Err(StreamError::SourceUnavailable(format!(
                        "object ended at {} bytes, before offset {}",
                        entry.bytes_written, pos
                    )))
                }
                JobState::Queued | JobState::Fetching => {}
            }
            self.wait_for_change(notified, &entry).await?;
        }
    }

    /// Turn the follower into a stream over `[start, end)`.
    pub fn into_body(self, start: u64, end: u64) -> BoxStream<'static, Result<Bytes, StreamError>> {
        let stream = futures::stream::try_unfold((self, start), move |(mut f, pos)| async move {
            if pos >= end {
                return Ok(None);
            }
            let bytes = f.next_chunk(pos, end).await?;
            let next = pos + bytes.len() as u64;
            Ok(Some((bytes, (f, next))))
        });
        Box::pin(stream)
    }
}
