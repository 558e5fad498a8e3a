//! `epistream serve` – run the HTTP server and pipeline until interrupted.

use anyhow::{bail, Context, Result};
use epistream_core::catalog::SqliteCatalog;
use epistream_core::config::{self, EpiConfig};
use epistream_core::http;
use epistream_core::source::CurlContentSource;
use epistream_core::store::CurlObjectStore;
use epistream_core::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How long in-flight fetches and relays get to finish after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub async fn run_serve(
    mut cfg: EpiConfig,
    catalog: SqliteCatalog,
    listen: Option<String>,
    workers: Option<usize>,
) -> Result<()> {
    if let Some(addr) = listen {
        cfg.listen_addr = addr;
    }
    if let Some(n) = workers {
        cfg.fetch_workers = n;
    }
    if cfg.source.base_url.is_empty() || cfg.storage.base_url.is_empty() {
        let path = config::config_path()?;
        bail!(
            "set [source] and [storage] base_url in {} before serving",
            path.display()
        );
    }

    let source = Arc::new(CurlContentSource::new(&cfg.source, &cfg.fetch));
    let store = Arc::new(CurlObjectStore::new(&cfg.storage, &cfg.relay));
    let pipeline = Pipeline::start(&cfg, source, store, Arc::new(catalog)).await?;

    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;
    println!("epistream listening on {}", listener.local_addr()?);

    let served = http::serve(listener, Arc::clone(&pipeline), shutdown_signal()).await;
    pipeline.shutdown(SHUTDOWN_GRACE).await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("interrupt received, shutting down");
}
