use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub job_id: Option<String>,
}

/// `GET /api/status?job_id=`: relays `GET {backend}/status/{job_id}`, keeping
/// the backend's status code and body.
pub async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, AppError> {
    let job_id = query
        .job_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("job_id is required".to_string()))?;

    let url = format!("{}/status/{}", state.backend_url, urlencoding::encode(job_id));
    tracing::debug!(%url, "relaying job status");
    let upstream = state
        .backend
        .get(&url)
        .send()
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let body = upstream
        .bytes()
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
}
