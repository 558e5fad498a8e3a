//! Catalog, fetch, progress and maintenance endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::catalog::{Episode, SeriesSummary};
use crate::gate::SubmitStatus;
use crate::job::{ObjectId, Priority};
use crate::pipeline::{PipelineStatus, ProgressReport, SeasonSubmission};
use crate::reaper::SweepReport;

#[derive(Debug, Serialize)]
pub(super) struct FetchResponse {
    status: SubmitStatus,
    object_id: ObjectId,
    priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_url: Option<String>,
}

pub(super) async fn list_series(State(state): State<AppState>) -> ApiResult<Json<Vec<SeriesSummary>>> {
    Ok(Json(state.pipeline.catalog().list_series().await?))
}

pub(super) async fn list_seasons(
    State(state): State<AppState>,
    Path(series): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    state
        .pipeline
        .catalog()
        .list_seasons(&series)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown series {series:?}")))
}

pub(super) async fn list_episodes(
    State(state): State<AppState>,
    Path((series, season)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Episode>>> {
    state
        .pipeline
        .catalog()
        .list_episodes(&series, &season)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown season {series:?} / {season:?}")))
}

pub(super) async fn fetch_object(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<FetchResponse>> {
    let object_id = ObjectId::new(raw)?;
    let sub = state
        .pipeline
        .submit(&object_id, Priority::Interactive, None)
        .await?;
    tracing::info!(%object_id, status = sub.status.as_str(), "fetch requested");
    Ok(Json(FetchResponse {
        status: sub.status,
        object_id,
        priority: sub.priority,
        remote_url: sub.remote_url,
    }))
}

pub(super) async fn fetch_season(
    State(state): State<AppState>,
    Path((series, season)): Path<(String, String)>,
) -> ApiResult<Json<SeasonSubmission>> {
    state
        .pipeline
        .submit_season(&series, &season)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown season {series:?} / {season:?}")))
}

pub(super) async fn progress(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<ProgressReport>> {
    let object_id = ObjectId::new(raw)?;
    Ok(Json(state.pipeline.progress(&object_id)))
}

pub(super) async fn status(State(state): State<AppState>) -> Json<PipelineStatus> {
    Json(state.pipeline.status().await)
}

pub(super) async fn cleanup(State(state): State<AppState>) -> Json<SweepReport> {
    Json(state.pipeline.sweep().await)
}

pub(super) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
