//! JSON error responses: `{ "error": <code>, "detail": <message> }`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::gate::GateError;
use crate::job::InvalidObjectId;
use crate::stream::StreamError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    BadObjectId(#[from] InvalidObjectId),
    #[error("range not satisfiable (object is {total} bytes)")]
    RangeUnsatisfiable { total: u64 },
    /// The content source could not deliver the object.
    #[error("{0}")]
    SourceUnavailable(String),
    /// A fetch in progress stopped delivering bytes.
    #[error("{0}")]
    Stalled(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadObjectId(_) => StatusCode::BAD_REQUEST,
            ApiError::RangeUnsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Stalled(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadObjectId(_) => "bad_object_id",
            ApiError::RangeUnsatisfiable { .. } => "range_unsatisfiable",
            ApiError::SourceUnavailable(_) => "source_unavailable",
            ApiError::Stalled(_) => "stalled",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Catalog(e) => ApiError::Internal(e),
            GateError::Busy(_) | GateError::ShuttingDown => ApiError::Unavailable(err.to_string()),
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StreamError::RangeUnsatisfiable { total } => ApiError::RangeUnsatisfiable { total },
            StreamError::SourceUnavailable(_) => ApiError::SourceUnavailable(err.to_string()),
            StreamError::Stalled(_) => ApiError::Stalled(err.to_string()),
            StreamError::Io(e) => ApiError::Internal(e.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "request failed: {:#}", self);
        }
        let body = Json(json!({
            "error": self.code(),
            "detail": format!("{:#}", self),
        }));
        let mut resp = (status, body).into_response();
        if let ApiError::RangeUnsatisfiable { total } = self {
            if let Ok(v) = HeaderValue::from_str(&format!("bytes */{total}")) {
                resp.headers_mut().insert(header::CONTENT_RANGE, v);
            }
        }
        resp
    }
}
