use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use roomscan_core::{JobId, ProgressEvent};
use roomscan_worker::ProgressSubscription;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Subscribe to live progress over a WebSocket
///
/// Sends the current state first, then every progress event as a JSON text frame.
/// The server closes the socket after the terminal event.
#[utoipa::path(
    get,
    path = "/api/scans/{id}/events",
    tag = "scans",
    params(
        ("id" = String, Path, description = "Scan job ID"),
        ("token" = Option<String>, Query, description = "Bearer token, for clients that cannot set headers")
    ),
    responses(
        (status = 101, description = "Switching to WebSocket; frames are ProgressEvent JSON", body = ProgressEvent),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn scan_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, HttpAppError> {
    let id = JobId::parse(&id)?;

    // Subscribe before reading the snapshot so no event falls in between.
    let subscription = state.hub.subscribe(&id);
    let record = state.store.load(&id).await?;
    let snapshot = ProgressEvent::from(&record);

    Ok(ws.on_upgrade(move |socket| stream_progress(socket, snapshot, subscription)))
}

async fn send_event(socket: &mut WebSocket, event: &ProgressEvent) -> bool {
    let Ok(text) = serde_json::to_string(event) else {
        return false;
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn stream_progress(
    mut socket: WebSocket,
    snapshot: ProgressEvent,
    mut subscription: ProgressSubscription,
) {
    let job_id = subscription.job_id().clone();
    tracing::debug!(job_id = %job_id, "Progress subscriber connected");

    if !send_event(&mut socket, &snapshot).await {
        return;
    }
    let mut last = snapshot;

    while !last.is_terminal() {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                // Events buffered before the snapshot was read can be older than it.
                if !event.is_terminal() && (event.progress < last.progress || event == last) {
                    continue;
                }
                if !send_event(&mut socket, &event).await {
                    return;
                }
                last = event;
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::debug!(job_id = %job_id, "Progress subscriber disconnected");
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    tracing::debug!(job_id = %job_id, status = %last.status, "Progress stream closed");
}
