use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use modelship_publish::{DeployRequest, DeploymentPipeline, DeploymentResult};
use serde::Serialize;
use tracing::Instrument;
use ulid::Ulid;

use crate::{AppError, AppState};

pub const REQUESTER_HEADER: &str = "x-requester-id";
const ARCHIVE_FIELDS: [&str; 2] = ["file", "archive"];
const FALLBACK_FILENAME: &str = "upload.zip";

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: DeploymentResult,
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if !field.name().is_some_and(|n| ARCHIVE_FIELDS.contains(&n)) {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_FILENAME)
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
        return Ok(Upload { filename, bytes });
    }
    Err(AppError::BadRequest(
        "no archive uploaded (expected a multipart field named `file`)".to_string(),
    ))
}

/// `POST /api/deploy`
pub async fn deploy(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DeployResponse>, AppError> {
    let multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let upload = read_upload(multipart).await?;
    if upload.bytes.is_empty() {
        return Err(AppError::BadRequest("uploaded archive is empty".to_string()));
    }

    let requester = headers
        .get(REQUESTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let mut request = DeployRequest::new(upload.bytes, upload.filename);
    if let Some(requester) = requester {
        request = request.with_requester(requester);
    }

    let request_id = Ulid::new();
    let span = tracing::info_span!("deploy", %request_id);
    let mut pipeline = DeploymentPipeline::new(state.host.clone(), (*state.settings).clone());
    let result = pipeline
        .run(request, state.shutdown.child_token())
        .instrument(span)
        .await?;

    Ok(Json(DeployResponse {
        success: true,
        result,
    }))
}
