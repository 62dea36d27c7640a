//! HTTP status mapping for runtime errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use trellis_runtime::RuntimeError;

/// A runtime error rendered as an HTTP response.
///
/// Every error becomes a JSON envelope `{"error": "..."}` with a status
/// that distinguishes "does not exist" (404) from "exists but is not
/// serving" (503) from genuine faults (5xx).
#[derive(Debug)]
pub struct ApiError(pub RuntimeError);

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RuntimeError::UnknownProject(_)
            | RuntimeError::UnknownSlug(_)
            | RuntimeError::RouteNotFound => StatusCode::NOT_FOUND,
            RuntimeError::NotRunning(_) => StatusCode::SERVICE_UNAVAILABLE,
            RuntimeError::AlreadyRunning(_) | RuntimeError::NoRelease(_) => StatusCode::CONFLICT,
            RuntimeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RuntimeError::BootFailure(_)
            | RuntimeError::StartFailure(_)
            | RuntimeError::Configuration(_)
            | RuntimeError::Invocation(_)
            | RuntimeError::Storage(_)
            | RuntimeError::Modules(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
