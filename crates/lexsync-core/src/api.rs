//! HTTP error responses shared by the control, webhook, and metrics routers

use crate::error::SyncError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// JSON error body returned by every API endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable summary
    pub message: String,
}

/// Wrapper turning a [`SyncError`] into an HTTP response.
///
/// Handlers return `Result<_, ApiError>` and propagate with `?`.
#[derive(Debug)]
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::ConnectionNotFound { .. } | SyncError::JobNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            SyncError::SignatureInvalid | SyncError::ReauthorizationRequired { .. } => {
                StatusCode::UNAUTHORIZED
            }
            SyncError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            SyncError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            SyncError::StorageConflict { .. } => StatusCode::CONFLICT,
            SyncError::TransientRemote { .. } | SyncError::Timeout { .. } => {
                StatusCode::BAD_GATEWAY
            }
            SyncError::Database(_)
            | SyncError::Serialization(_)
            | SyncError::Metrics(_)
            | SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
