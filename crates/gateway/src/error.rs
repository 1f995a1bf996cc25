//! HTTP mapping of registry and generation failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tilecast_core::error::RegistryError;
use tracing::error;

/// An error response: status plus `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// No dashboard could be produced and none was stored.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::UserNotFound(_) | RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            RegistryError::UserExists(_)
            | RegistryError::InvalidEndpoint(_)
            | RegistryError::EndpointTaken { .. } => StatusCode::BAD_REQUEST,
            RegistryError::Storage(_) => {
                error!(error = %err, "Registry storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
