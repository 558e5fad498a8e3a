//! In-process `ContentSource` and `ObjectStore` with scripted behaviour.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use epistream_core::job::ObjectId;
use epistream_core::retry::TransferError;
use epistream_core::source::{ContentSource, SourceStream};
use epistream_core::store::ObjectStore;

pub struct FakeSource {
    objects: Mutex<HashMap<ObjectId, Bytes>>,
    /// Opens that fail with a connection error before one succeeds.
    fail_first: Mutex<HashMap<ObjectId, u32>>,
    /// The body stops at this byte until the semaphore gets a permit.
    holds: Mutex<HashMap<ObjectId, (u64, Arc<Semaphore>)>>,
    opens: Mutex<Vec<(ObjectId, u64)>>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl FakeSource {
    pub fn new(chunk_size: usize, chunk_delay: Duration) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_first: Mutex::new(HashMap::new()),
            holds: Mutex::new(HashMap::new()),
            opens: Mutex::new(Vec::new()),
            chunk_size: chunk_size.max(1),
            chunk_delay,
        }
    }

    pub fn with_object(self, id: &ObjectId, data: Vec<u8>) -> Self {
        self.objects.lock().unwrap().insert(id.clone(), Bytes::from(data));
        self
    }

    pub fn fail_first(self, id: &ObjectId, times: u32) -> Self {
        self.fail_first.lock().unwrap().insert(id.clone(), times);
        self
    }

    /// Pause the body of `id` at byte `at`; add a permit to resume.
    pub fn hold_at(&self, id: &ObjectId, at: u64) -> Arc<Semaphore> {
        let sem = Arc::new(Semaphore::new(0));
        self.holds
            .lock()
            .unwrap()
            .insert(id.clone(), (at, Arc::clone(&sem)));
        sem
    }

    pub fn opens(&self, id: &ObjectId) -> usize {
        self.opens.lock().unwrap().iter().filter(|(o, _)| o == id).count()
    }

    pub fn total_opens(&self) -> usize {
        self.opens.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn open(&self, id: &ObjectId, offset: u64) -> Result<SourceStream, TransferError> {
        self.opens.lock().unwrap().push((id.clone(), offset));
        {
            let mut failures = self.fail_first.lock().unwrap();
            if let Some(left) = failures.get_mut(id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(TransferError::Connection("scripted failure".into()));
                }
            }
        }
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(id.to_string()))?;
        let hold = self.holds.lock().unwrap().get(id).cloned();
        let total = data.len() as u64;
        let chunk = self.chunk_size as u64;
        let delay = self.chunk_delay;

        let body = futures::stream::unfold((offset, hold), move |(pos, mut hold)| {
            let data = data.clone();
            async move {
                if pos >= total {
                    return None;
                }
                let mut end = (pos + chunk).min(total);
                if let Some((at, sem)) = hold.clone() {
                    if pos >= at {
                        if let Ok(permit) = sem.acquire().await {
                            permit.forget();
                        }
                        hold = None;
                    } else {
                        end = end.min(at);
                    }
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let bytes = data.slice(pos as usize..end as usize);
                Some((Ok(bytes), (end, hold)))
            }
        });
        Ok(SourceStream {
            start_offset: offset,
            total_len: Some(total),
            body: Box::pin(body),
        })
    }
}

#[derive(Default)]
pub struct FakeStore {
    /// chunk index -> failures left (u32::MAX fails forever).
    failures: Mutex<HashMap<usize, u32>>,
    puts: Mutex<Vec<(String, Bytes)>>,
    commits: Mutex<Vec<(ObjectId, Vec<String>)>>,
    attempts: AtomicUsize,
}

impl FakeStore {
    pub fn failing_chunk(self, index: usize, times: u32) -> Self {
        self.failures.lock().unwrap().insert(index, times);
        self
    }

    pub fn commits(&self) -> Vec<(ObjectId, Vec<String>)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Bytes stored for `id`, chunks concatenated in key order.
    pub fn assembled(&self, id: &ObjectId) -> Vec<u8> {
        let prefix = format!("{}/", id);
        let mut parts: Vec<(String, Bytes)> = self
            .puts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .cloned()
            .collect();
        parts.sort_by(|a, b| a.0.cmp(&b.0));
        parts.into_iter().flat_map(|(_, b)| b.to_vec()).collect()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put_chunk(&self, key: &str, data: Bytes) -> Result<(), TransferError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let index: usize = key
            .rsplit("part-")
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&index) {
                if *left > 0 {
                    if *left != u32::MAX {
                        *left -= 1;
                    }
                    return Err(TransferError::Http(503));
                }
            }
        }
        self.puts.lock().unwrap().push((key.to_string(), data));
        Ok(())
    }

    async fn commit(&self, id: &ObjectId, chunk_keys: &[String]) -> Result<String, TransferError> {
        self.commits
            .lock()
            .unwrap()
            .push((id.clone(), chunk_keys.to_vec()));
        Ok(format!("https://cdn.example/{id}"))
    }
}
