//! Progressive stream server.
//!
//! Serves byte ranges of an artifact that may still be growing. Reads never
//! go past the ledger's `bytes_written`; when a range reaches beyond it the
//! reader waits on the ledger's change notification (bounded by a short
//! poll) until more bytes land or the job reaches a terminal state.
//!
//! No minimum buffer is enforced here: "playable at N%" is a caller policy.

mod range;
mod reader;

use futures::stream::{BoxStream, Stream};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use bytes::Bytes;

use crate::config::StreamConfig;
use crate::job::{JobState, ObjectId};
use crate::ledger::ProgressLedger;

pub use range::{RangeRequest, ResolvedRange};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("no local data for {0}")]
    NotFound(ObjectId),
    #[error("range not satisfiable (object is {total} bytes)")]
    RangeUnsatisfiable { total: u64 },
    /// The fetch failed before the requested bytes arrived.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("no progress for {0:?}")]
    Stalled(Duration),
    #[error("reading local data: {0}")]
    Io(#[from] std::io::Error),
}

/// A finite, non-restartable byte stream over one resolved range.
pub struct ProgressiveStream {
    range: ResolvedRange,
    body: BoxStream<'static, Result<Bytes, StreamError>>,
}

impl std::fmt::Debug for ProgressiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveStream")
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl ProgressiveStream {
    pub fn range(&self) -> &ResolvedRange {
        &self.range
    }
}

impl Stream for ProgressiveStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.as_mut().poll_next(cx)
    }
}

#[derive(Debug, Clone)]
pub struct StreamServer {
    ledger: Arc<ProgressLedger>,
    cfg: StreamConfig,
}

impl StreamServer {
    pub fn new(ledger: Arc<ProgressLedger>, cfg: StreamConfig) -> Self {
        Self { ledger, cfg }
    }

    /// True if the ledger still points at a local artifact for `id`.
    pub fn has_local(&self, id: &ObjectId) -> bool {
        let Some(watch) = self.ledger.watch(id) else {
            return false;
        };
        let usable = self
            .ledger
            .get(id)
            .is_some_and(|e| e.state != JobState::Failed);
        usable && watch.local_path.is_some_and(|p| p.exists())
    }

    /// Open a stream over `range` of `id`.
    ///
    /// Waits until the object length is known (the source reported it, or
    /// the fetch completed) so the range can be resolved and the response
    /// headers are exact.
    pub async fn open_stream(
        &self,
        id: &ObjectId,
        range: RangeRequest,
    ) -> Result<ProgressiveStream, StreamError> {
        let mut follower = reader::Follower::new(Arc::clone(&self.ledger), id.clone(), &self.cfg)?;
        let total = follower.wait_for_total().await?;
        let resolved = range
            .resolve(total)
            .map_err(|total| StreamError::RangeUnsatisfiable { total })?;
        tracing::debug!(object_id = %id, start = resolved.start, end = resolved.end, total, "stream opened");
        let body = follower.into_body(resolved.start, resolved.end);
        Ok(ProgressiveStream {
            range: resolved,
            body,
        })
    }
}
