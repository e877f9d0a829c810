use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::application::dto::ErrorResponse;
use crate::domain::errors::DomainError;

/// Error HTTP: código de estado más cuerpo `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Para `/video`: una cámara que no abre es un servicio no disponible.
    pub fn unavailable(err: DomainError) -> Self {
        match err {
            DomainError::SourceUnavailable(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            other => other.into(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let status = match &err {
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::InvalidInput(_)
            | DomainError::Unsupported(_)
            | DomainError::Decode(_)
            | DomainError::SourceUnavailable(_) => StatusCode::BAD_REQUEST,
            DomainError::Inference(_) | DomainError::OperationFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("❌ {} {}", self.status, self.message);
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}
