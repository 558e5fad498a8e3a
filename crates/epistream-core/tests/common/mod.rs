#![allow(dead_code)]

pub mod fakes;
pub mod origin;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use epistream_core::catalog::{CatalogStore, SqliteCatalog};
use epistream_core::config::{EpiConfig, RetryConfig};
use epistream_core::job::ObjectId;
use epistream_core::Pipeline;

use fakes::{FakeSource, FakeStore};

/// Config tuned for tests: small chunks, millisecond backoff, fast polling.
pub fn test_config(data_dir: &Path) -> EpiConfig {
    let mut cfg = EpiConfig::default();
    cfg.data_dir = Some(data_dir.to_path_buf());
    cfg.fetch_workers = 2;
    cfg.retry = Some(RetryConfig {
        max_attempts: 3,
        base_delay_secs: 0.001,
        max_delay_secs: 1,
    });
    cfg.fetch.progress_flush_bytes = 1024;
    cfg.fetch.progress_interval_ms = 5;
    cfg.stream.poll_ms = 10;
    cfg.stream.stall_secs = 5;
    cfg.relay.chunk_size_bytes = 16 * 1024;
    cfg.relay.chunk_base_delay_secs = 0.001;
    cfg.relay.chunk_timeout_secs = 5;
    cfg
}

pub fn id(s: &str) -> ObjectId {
    ObjectId::new(s).unwrap()
}

/// Deterministic, non-repeating-ish test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub source: Arc<FakeSource>,
    pub store: Arc<FakeStore>,
    pub catalog: Arc<SqliteCatalog>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn start(source: FakeSource, store: FakeStore) -> Self {
        Self::start_with(source, store, |_| {}).await
    }

    pub async fn start_with(
        source: FakeSource,
        store: FakeStore,
        tweak: impl FnOnce(&mut EpiConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        tweak(&mut cfg);
        let source = Arc::new(source);
        let store = Arc::new(store);
        let catalog = Arc::new(SqliteCatalog::open_memory().await.unwrap());
        let pipeline = Pipeline::start(
            &cfg,
            source.clone(),
            store.clone(),
            catalog.clone() as Arc<dyn CatalogStore>,
        )
        .await
        .unwrap();
        Self {
            pipeline,
            source,
            store,
            catalog,
            dir,
        }
    }

    pub async fn shutdown(&self) {
        self.pipeline.shutdown(Duration::from_secs(2)).await;
    }
}
