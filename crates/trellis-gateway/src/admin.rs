//! The admin lifecycle surface under `/api/projects/{id}`.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use trellis_core::ProjectId;
use trellis_runtime::{LogLine, ProjectStatus, RuntimeError};

use crate::app::AppState;
use crate::error::ApiError;

/// A malformed id cannot name any project, so it reads as unknown rather
/// than as a distinct validation failure.
fn parse_id(raw: &str) -> Result<ProjectId, ApiError> {
    ProjectId::new(raw)
        .map_err(|_| ApiError(RuntimeError::UnknownProject(ProjectId::from_static(raw))))
}

pub(crate) async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    state.manager.start(&id).await?;
    Ok(Json(json!({ "started": true })))
}

pub(crate) async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let outcome = state.manager.stop(&id).await?;
    Ok(Json(json!({ "stopped": true, "timed_out": outcome.timed_out })))
}

pub(crate) async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectStatus>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.manager.status(&id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsQuery {
    #[serde(default)]
    offset: u64,
    #[serde(default = "default_log_limit")]
    limit: usize,
}

fn default_log_limit() -> usize {
    100
}

pub(crate) async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogLine>>, ApiError> {
    let id = parse_id(&id)?;
    let lines = state.manager.logs(&id, query.offset, query.limit).await?;
    Ok(Json(lines))
}
