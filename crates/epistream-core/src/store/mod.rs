//! Durable object storage the relay pushes finished artifacts to.

mod curl_store;

use async_trait::async_trait;
use bytes::Bytes;

use crate::job::ObjectId;
use crate::retry::TransferError;

pub use curl_store::CurlObjectStore;

/// Key a chunk is stored under: `<object id>/part-<index>`.
pub fn chunk_key(id: &ObjectId, index: usize) -> String {
    format!("{}/part-{:05}", id, index)
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store one chunk under `key`. Must be safe to repeat for the same key.
    async fn put_chunk(&self, key: &str, data: Bytes) -> Result<(), TransferError>;

    /// Assemble the uploaded chunks (in order) into the object and return
    /// its public URL.
    async fn commit(&self, id: &ObjectId, chunk_keys: &[String]) -> Result<String, TransferError>;
}
