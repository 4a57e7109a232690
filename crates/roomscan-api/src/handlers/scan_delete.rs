use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use roomscan_core::JobId;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Delete a job and all of its files
#[utoipa::path(
    delete,
    path = "/api/scans/{id}",
    tag = "scans",
    params(("id" = String, Path, description = "Scan job ID")),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(operation = "delete_scan"))]
pub async fn delete_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpAppError> {
    let id = JobId::parse(&id)?;
    if state.queue.is_active(&id) {
        tracing::info!(job_id = %id, "Deleting job that is still queued or running");
    }
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
