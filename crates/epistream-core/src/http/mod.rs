//! HTTP surface over the pipeline.

mod error;
mod handlers;
mod stream;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::pipeline::Pipeline;

pub use error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/catalog/series", get(handlers::list_series))
        .route("/catalog/series/{series}", get(handlers::list_seasons))
        .route("/catalog/series/{series}/{season}", get(handlers::list_episodes))
        .route("/fetch/{object_id}", post(handlers::fetch_object))
        .route("/fetch/season/{series}/{season}", post(handlers::fetch_season))
        .route("/progress/{object_id}", get(handlers::progress))
        // `get` also answers HEAD; the handler skips the body wait for it.
        .route("/stream/{object_id}", get(stream::stream_object))
        .route("/status", get(handlers::status))
        .route("/cleanup", post(handlers::cleanup))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, pipeline: Arc<Pipeline>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("listener address")?;
    tracing::info!(%addr, "http server listening");
    axum::serve(listener, router(AppState { pipeline }))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server")
}
