use std::sync::Arc;

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use roomscan_core::constants::INPUT_STEM;
use roomscan_core::{parse_metadata, AppError, JobId, JobRecord, ScanMetadata};
use roomscan_storage::ScratchFile;
use serde::Serialize;
use utoipa::ToSchema;

use crate::constants::API_PREFIX;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Id of the accepted conversion job
    pub id: String,
}

/// A streamed `file` field, not yet validated.
struct ReceivedFile {
    scratch: ScratchFile,
    filename: String,
    content_type: Option<String>,
}

/// Upload a room scan for conversion
///
/// Streams the `file` field into the scratch area, validates its type and the optional
/// `meta` field, then creates a pending job and queues it. Nothing is persisted unless
/// every check passes and the queue has room.
#[utoipa::path(
    post,
    path = "/api/scans",
    tag = "scans",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Scan accepted for conversion", body = UploadResponse),
        (status = 400, description = "Invalid upload or metadata", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 429, description = "Conversion queue full", body = ErrorResponse),
        (status = 503, description = "Service shutting down", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, multipart), fields(operation = "upload_scan"))]
pub async fn upload_scan(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, HttpAppError> {
    let mut received: Option<ReceivedFile> = None;
    let mut meta_raw: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                if received.is_some() {
                    return Err(AppError::InvalidInput(
                        "Only one 'file' field is allowed".to_string(),
                    )
                    .into());
                }
                received = Some(receive_file(&state, field).await?);
            }
            Some("meta") => {
                meta_raw = Some(receive_meta(state.config.max_meta_bytes, field).await?);
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    let ReceivedFile {
        scratch,
        filename,
        content_type,
    } = received.ok_or_else(|| AppError::MissingFile("'file' field is required".to_string()))?;

    if scratch.is_empty() {
        scratch.discard().await;
        return Err(AppError::EmptyFile.into());
    }

    let extension = state
        .validator
        .validate(&filename, content_type.as_deref(), scratch.head())?;

    let meta = match meta_raw {
        Some(raw) => parse_metadata(&raw, state.config.max_meta_bytes)?,
        None => ScanMetadata::default(),
    };

    let slot = state.queue.try_reserve()?;

    let id = JobId::generate();
    let input_name = format!("{}.{}", INPUT_STEM, extension);
    let size = scratch.len();
    let record = JobRecord::new(id.clone(), meta, input_name.clone());

    state.store.create(&record).await?;
    let input_path = state.store.input_path(&id, &input_name)?;
    if let Err(e) = scratch.persist_to(&input_path).await {
        remove_partial_job(&state, &id).await;
        return Err(e.into());
    }

    if let Err(e) = slot.submit(id.clone()) {
        remove_partial_job(&state, &id).await;
        return Err(e.into());
    }

    tracing::info!(
        job_id = %id,
        extension = %extension,
        size_bytes = size,
        "Scan accepted for conversion"
    );

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, format!("{}/scans/{}", API_PREFIX, id))],
        Json(UploadResponse { id: id.to_string() }),
    )
        .into_response())
}

async fn receive_file(
    state: &AppState,
    mut field: Field<'_>,
) -> Result<ReceivedFile, HttpAppError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let max = state.config.max_upload_bytes;

    let mut scratch = state.scratch.create().await?;
    while let Some(chunk) = field.chunk().await? {
        if scratch.len() + chunk.len() as u64 > max {
            scratch.discard().await;
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds max {} bytes",
                max
            ))
            .into());
        }
        scratch.write(&chunk).await?;
    }

    Ok(ReceivedFile {
        scratch,
        filename,
        content_type,
    })
}

async fn receive_meta(max: usize, mut field: Field<'_>) -> Result<String, HttpAppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if buf.len() + chunk.len() > max {
            return Err(AppError::MetadataTooLarge {
                size: buf.len() + chunk.len(),
                max,
            }
            .into());
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf)
        .map_err(|_| AppError::InvalidInput("'meta' must be UTF-8 text".to_string()).into())
}

async fn remove_partial_job(state: &AppState, id: &JobId) {
    if let Err(e) = state.store.delete(id).await {
        tracing::error!(job_id = %id, error = %e, "Failed to remove partially created job");
    }
}
