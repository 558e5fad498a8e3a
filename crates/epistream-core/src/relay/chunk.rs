//! Chunk planning and single-chunk transfer.

use bytes::Bytes;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::Instant;

use crate::job::ObjectId;
use crate::retry::TransferError;
use crate::store::ObjectStore;

/// One slice of an artifact on its way to storage. Owned by a single
/// in-flight upload per attempt; put back in the retry queue with a
/// `not_before` instant when the attempt fails.
#[derive(Debug, Clone)]
pub struct UploadChunk {
    pub object_id: ObjectId,
    pub sequence_index: usize,
    pub byte_range: Range<u64>,
    /// 1-based number of the current attempt.
    pub attempt_count: u32,
    pub not_before: Instant,
}

/// Split `len` bytes into `chunk_size` pieces. An empty artifact still gets
/// one (empty) chunk so the object exists remotely.
pub(super) fn plan(id: &ObjectId, len: u64, chunk_size: u64) -> Vec<UploadChunk> {
    let chunk_size = chunk_size.max(1);
    let now = Instant::now();
    let count = len.div_ceil(chunk_size).max(1);
    (0..count)
        .map(|i| UploadChunk {
            object_id: id.clone(),
            sequence_index: i as usize,
            byte_range: (i * chunk_size)..((i + 1) * chunk_size).min(len),
            attempt_count: 1,
            not_before: now,
        })
        .collect()
}

async fn read_range(path: &Path, range: &Range<u64>) -> std::io::Result<Bytes> {
    let mut f = tokio::fs::File::open(path).await?;
    f.seek(std::io::SeekFrom::Start(range.start)).await?;
    let mut buf = vec![0u8; (range.end - range.start) as usize];
    f.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Read the chunk from disk and upload it, bounded by `timeout`.
pub(super) async fn send(
    store: &dyn ObjectStore,
    path: &Path,
    key: &str,
    chunk: &UploadChunk,
    timeout: Duration,
) -> Result<(), TransferError> {
    let data = read_range(path, &chunk.byte_range).await?;
    match tokio::time::timeout(timeout, store.put_chunk(key, data)).await {
        Ok(res) => res,
        Err(_) => Err(TransferError::TimedOut {
            what: "chunk upload",
            after: timeout,
        }),
    }
}
