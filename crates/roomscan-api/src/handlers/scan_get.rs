use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use roomscan_core::config::parse_positive;
use roomscan_core::constants::{DEFAULT_PAGE, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use roomscan_core::{AppError, JobId, JobStatus};
use roomscan_storage::hash::sha256_bytes;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::constants::INFO_CACHE_CONTROL;
use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::conditional::{etag, http_date, is_not_modified};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ScanStatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    /// Artifact URL, present once the job is done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pagination parameters. Raw strings so bad values fall back to defaults instead of
/// rejecting the request.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    /// 1-based page number (default 1)
    pub page: Option<String>,
    /// Page size (default 20, max 100)
    pub limit: Option<String>,
}

/// Get conversion status
#[utoipa::path(
    get,
    path = "/api/scans/{id}",
    tag = "scans",
    params(("id" = String, Path, description = "Scan job ID")),
    responses(
        (status = 200, description = "Job status", body = ScanStatusResponse),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_scan_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScanStatusResponse>, HttpAppError> {
    let id = JobId::parse(&id)?;
    let record = state.store.load(&id).await?;

    Ok(Json(ScanStatusResponse {
        url: record.artifact_url(),
        status: record.status,
        progress: record.progress,
        error: record.error,
    }))
}

/// Get the persisted job record
///
/// Supports conditional requests; the entity tag is the SHA-256 of the stored record.
#[utoipa::path(
    get,
    path = "/api/scans/{id}/info",
    tag = "scans",
    params(("id" = String, Path, description = "Scan job ID")),
    responses(
        (status = 200, description = "Job record", body = roomscan_core::JobRecord),
        (status = 304, description = "Not modified"),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_scan_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    let id = JobId::parse(&id)?;
    let snapshot = state.store.read_info(&id).await?;

    let tag = etag(&sha256_bytes(&snapshot.bytes));
    let last_modified = http_date(snapshot.modified);
    let not_modified = is_not_modified(&headers, &tag, snapshot.modified);

    let builder = Response::builder()
        .header(header::ETAG, &tag)
        .header(header::LAST_MODIFIED, &last_modified)
        .header(header::CACHE_CONTROL, INFO_CACHE_CONTROL);

    let response = if not_modified {
        builder.status(StatusCode::NOT_MODIFIED).body(Body::empty())
    } else {
        builder
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, snapshot.bytes.len())
            .body(Body::from(snapshot.bytes))
    };

    response.map_err(|e| {
        tracing::error!(error = %e, "Failed to build response");
        AppError::Internal(e.to_string()).into()
    })
}

/// List job ids
#[utoipa::path(
    get,
    path = "/api/scans",
    tag = "scans",
    params(ListQuery),
    responses(
        (status = 200, description = "Job ids ordered by id", body = Vec<String>)
    ),
    security(("bearer" = []))
)]
pub async fn list_scans(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let page = parse_positive("page", query.page, DEFAULT_PAGE);
    let limit = parse_positive("limit", query.limit, DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);

    let ids: Vec<String> = state
        .store
        .list_ids()
        .await?
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .map(String::from)
        .collect();

    Ok(Json(ids))
}
