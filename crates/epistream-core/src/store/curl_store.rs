//! libcurl adapter for `ObjectStore`: chunks are `PUT` to
//! `<base_url>/<key>`, then a JSON manifest listing them is `PUT` to
//! `<base_url>/<object id>/manifest.json`. The public URL is
//! `<public_url or base_url>/<object id>`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;

use super::ObjectStore;
use crate::config::{EndpointConfig, RelayConfig};
use crate::job::ObjectId;
use crate::retry::TransferError;

#[derive(Debug, Clone)]
pub struct CurlObjectStore {
    base_url: String,
    public_url: String,
    headers: HashMap<String, String>,
    transfer_timeout: Duration,
}

#[derive(Serialize)]
struct Manifest<'a> {
    object_id: &'a str,
    chunks: &'a [String],
}

impl CurlObjectStore {
    pub fn new(endpoint: &EndpointConfig, relay: &RelayConfig) -> Self {
        let base_url = endpoint.base_url.trim_end_matches('/').to_string();
        let public_url = endpoint
            .public_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| base_url.clone());
        Self {
            base_url,
            public_url,
            headers: endpoint.headers.clone(),
            transfer_timeout: Duration::from_secs(relay.chunk_timeout_secs.max(1)),
        }
    }

    async fn put(&self, url: String, content_type: &'static str, body: Bytes) -> Result<(), TransferError> {
        let headers = self.headers.clone();
        let timeout = self.transfer_timeout;
        tokio::task::spawn_blocking(move || put_blocking(&url, &headers, content_type, &body, timeout))
            .await
            .map_err(|e| TransferError::Connection(format!("upload task failed: {e}")))?
    }
}

fn put_blocking(
    url: &str,
    headers: &HashMap<String, String>,
    content_type: &str,
    body: &[u8],
    timeout: Duration,
) -> Result<(), TransferError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.upload(true)?;
    easy.in_filesize(body.len() as u64)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    easy.timeout(timeout)?;

    let mut list = curl::easy::List::new();
    list.append(&format!("Content-Type: {}", content_type))?;
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    easy.http_headers(list)?;

    let mut reader = body;
    {
        let mut transfer = easy.transfer();
        transfer.read_function(|buf| Ok(reader.read(buf).unwrap_or(0)))?;
        // Response bodies are not used.
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for CurlObjectStore {
    async fn put_chunk(&self, key: &str, data: Bytes) -> Result<(), TransferError> {
        let url = format!("{}/{}", self.base_url, key);
        self.put(url, "application/octet-stream", data).await
    }

    async fn commit(&self, id: &ObjectId, chunk_keys: &[String]) -> Result<String, TransferError> {
        let manifest = Manifest {
            object_id: id.as_str(),
            chunks: chunk_keys,
        };
        let body = serde_json::to_vec(&manifest).map_err(std::io::Error::from)?;
        let url = format!("{}/{}/manifest.json", self.base_url, id);
        self.put(url, "application/json", Bytes::from(body)).await?;
        Ok(format!("{}/{}", self.public_url, id))
    }
}
