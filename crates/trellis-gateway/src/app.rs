//! Router assembly and shared handler state.

use std::sync::Arc;

use axum::routing;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use trellis_runtime::RuntimeManager;

use crate::{admin, dispatch};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The orchestration core behind the gateway.
    pub manager: Arc<RuntimeManager>,
}

/// Build the gateway router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", routing::get(health))
        .route("/api/projects/{id}/start", routing::post(admin::start))
        .route("/api/projects/{id}/stop", routing::post(admin::stop))
        .route("/api/projects/{id}/status", routing::get(admin::status))
        .route("/api/projects/{id}/logs", routing::get(admin::logs))
        .route("/r/{slug}", routing::any(dispatch::dispatch_root))
        .route("/r/{slug}/{*path}", routing::any(dispatch::dispatch_path))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
