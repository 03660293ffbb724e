//! Maps failures to JSON error bodies with the matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use modelship_publish::PublishError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// The request itself is malformed.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The inference backend could not be reached.
    #[error("backend unavailable: {0}")]
    BadGateway(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Publish(err) => {
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (stage, repository) = match self {
            AppError::Publish(err) => (
                err.stage().map(|s| s.to_string()),
                err.repository().map(str::to_string),
            ),
            _ => (None, None),
        };
        ErrorBody {
            success: false,
            error: self.to_string(),
            stage,
            repository,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{self}");
        }
        (status, axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelship_publish::DeployStage;

    #[test]
    fn publish_errors_keep_their_status() {
        let err = AppError::from(PublishError::Conflict {
            name: "model-deploy-x".into(),
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = AppError::from(PublishError::Timeout {
            stage: DeployStage::BuildingObjects,
            repository: Some("model-deploy-x".into()),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.body();
        assert!(!body.success);
        assert_eq!(body.stage.as_deref(), Some("building_objects"));
        assert_eq!(body.repository.as_deref(), Some("model-deploy-x"));
    }

    #[test]
    fn local_errors() {
        assert_eq!(
            AppError::BadRequest("missing".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::BadGateway("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        let body = AppError::BadRequest("missing".into()).body();
        assert_eq!(body.error, "missing");
        assert!(body.stage.is_none());
    }
}
