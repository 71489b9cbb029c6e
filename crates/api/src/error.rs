//! HTTP Error Mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use incident_core::IncidentError;
use serde::Serialize;
use storage::StorageError;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Incident(#[from] IncidentError),

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Incident(IncidentError::Storage(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Incident(err) => match err {
                IncidentError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
                IncidentError::PermissionDenied { .. } => {
                    (StatusCode::FORBIDDEN, "permission_denied")
                }
                IncidentError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                IncidentError::EmptyContent => (StatusCode::UNPROCESSABLE_ENTITY, "empty_content"),
                IncidentError::InvalidRange { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_range")
                }
                IncidentError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { error: code, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_validator::ValidationError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(IncidentError::Validation(ValidationError::NotFinite("temperature"))),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(IncidentError::PermissionDenied {
                    role: "visitor".to_string(),
                    field: "comment".to_string(),
                }),
                StatusCode::FORBIDDEN,
            ),
            (ApiError::from(IncidentError::NotFound), StatusCode::NOT_FOUND),
            (ApiError::from(IncidentError::EmptyContent), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ApiError::from(IncidentError::InvalidRange { min: 8.0, max: 2.0 }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(StorageError::DatabaseError("disk full".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::NotFound("reading"), StatusCode::NOT_FOUND),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
