//! `GET`/`HEAD /stream/{object_id}`.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::gate::SubmitStatus;
use crate::job::{ObjectId, Priority};
use crate::stream::{RangeRequest, ResolvedRange};

const MEDIA_TYPE: &str = "video/mp4";

pub(super) async fn stream_object(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let object_id = ObjectId::new(raw)?;
    let pipeline = &state.pipeline;
    let range = RangeRequest::parse(headers.get(header::RANGE).and_then(|v| v.to_str().ok()));

    // Starting the job first also makes HEAD a pre-flight trigger.
    let sub = pipeline
        .submit(&object_id, Priority::Interactive, None)
        .await?;
    if sub.status == SubmitStatus::AlreadyUploaded && !pipeline.streams().has_local(&object_id) {
        if let Some(url) = sub.remote_url {
            tracing::debug!(%object_id, %url, "redirecting to stored copy");
            return Ok(Redirect::temporary(&url).into_response());
        }
    }

    if method == Method::HEAD {
        let total = pipeline.ledger().get(&object_id).and_then(|e| e.bytes_total);
        return match total {
            Some(total) => {
                let resolved = range
                    .resolve(total)
                    .map_err(|total| ApiError::RangeUnsatisfiable { total })?;
                range_response(&resolved, Body::empty())
            }
            None => Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, MEDIA_TYPE), (header::ACCEPT_RANGES, "bytes")],
            )
                .into_response()),
        };
    }

    let stream = pipeline.streams().open_stream(&object_id, range).await?;
    let resolved = *stream.range();
    tracing::debug!(%object_id, start = resolved.start, end = resolved.end, "streaming");
    range_response(&resolved, Body::from_stream(stream))
}

fn range_response(range: &ResolvedRange, body: Body) -> ApiResult<Response> {
    let status = if range.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, MEDIA_TYPE)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, range.len());
    if range.partial {
        builder = builder.header(header::CONTENT_RANGE, range.content_range());
    }
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))
}
