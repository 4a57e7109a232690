use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
};
use roomscan_core::constants::GLB_CONTENT_TYPE;
use roomscan_core::{sanitize_filename, AppError, JobId};
use tokio_util::io::ReaderStream;

use crate::constants::ARTIFACT_CACHE_CONTROL;
use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::conditional::{etag, http_date, is_not_modified};
use crate::state::AppState;

/// Download the converted GLB
///
/// Serves `GET` and `HEAD`. Revalidation uses the artifact hash as entity tag and the
/// file's modification time.
#[utoipa::path(
    get,
    path = "/api/scans/{id}/room.glb",
    tag = "scans",
    params(("id" = String, Path, description = "Scan job ID")),
    responses(
        (status = 200, description = "Converted model", content_type = "model/gltf-binary"),
        (status = 304, description = "Not modified"),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "Job missing or not converted yet", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, headers), fields(operation = "download_artifact"))]
pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    let id = JobId::parse(&id)?;
    let artifact = state.store.artifact(&id).await?;

    let tag = etag(&artifact.hash);
    let filename = sanitize_filename(artifact.record.meta.filename.as_deref());

    let builder = Response::builder()
        .header(header::ETAG, &tag)
        .header(header::LAST_MODIFIED, http_date(artifact.modified))
        .header(header::CACHE_CONTROL, ARTIFACT_CACHE_CONTROL);

    if is_not_modified(&headers, &tag, artifact.modified) {
        return builder
            .status(StatusCode::NOT_MODIFIED)
            .body(Body::empty())
            .map_err(build_error);
    }

    let builder = builder
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, GLB_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, artifact.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "")),
        );

    if method == Method::HEAD {
        return builder.body(Body::empty()).map_err(build_error);
    }

    let file = tokio::fs::File::open(&artifact.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("{} artifact missing", id))
        } else {
            AppError::Storage(format!("Failed to open artifact: {}", e))
        }
    })?;

    tracing::debug!(job_id = %id, size_bytes = artifact.size, "Streaming artifact");
    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(build_error)
}

fn build_error(e: axum::http::Error) -> HttpAppError {
    tracing::error!(error = %e, "Failed to build response");
    AppError::Internal(e.to_string()).into()
}
