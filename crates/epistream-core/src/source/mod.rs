//! Remote content source: where media objects are fetched from.
//!
//! The pool only sees the `ContentSource` trait. `CurlContentSource` speaks
//! plain HTTP with `Range` requests to a gateway in front of the real source.

mod curl_source;
mod headers;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::job::ObjectId;
use crate::retry::TransferError;

pub use curl_source::CurlContentSource;

pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// An open transfer of one object.
pub struct SourceStream {
    /// Offset of the first byte `body` yields. A source that can't resume
    /// returns 0 even when asked for a later offset.
    pub start_offset: u64,
    /// Full object length, when the source knows it.
    pub total_len: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("start_offset", &self.start_offset)
            .field("total_len", &self.total_len)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync + 'static {
    /// Start streaming `id` from `offset` (best effort, see `SourceStream::start_offset`).
    async fn open(&self, id: &ObjectId, offset: u64) -> Result<SourceStream, TransferError>;
}
