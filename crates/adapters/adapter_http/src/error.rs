//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use lanbridge_domain::error::BridgeError;

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps control-API failures to HTTP responses with appropriate status
/// codes.
pub enum ApiError {
    /// Request rejected before reaching the registry.
    BadRequest(String),
    /// The registry or the owning backend refused the operation.
    Bridge(BridgeError),
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self::Bridge(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Bridge(err) => {
                let status = match &err {
                    BridgeError::UnknownDevice { .. } => StatusCode::NOT_FOUND,
                    BridgeError::Unsupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
                    BridgeError::Transport { .. } => {
                        tracing::error!(error = %err, "device transport error");
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, err.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
