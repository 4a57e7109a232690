use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use roomscan_core::AppError;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::HttpAppError;

/// Query parameter carrying the token on WebSocket upgrades (browsers cannot set headers there).
const TOKEN_QUERY_PARAM: &str = "token";

#[derive(Clone)]
pub struct AuthState {
    pub api_token: String,
}

impl AuthState {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
        }
    }
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h.eq_ignore_ascii_case("websocket"))
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == TOKEN_QUERY_PARAM)
        .and_then(|(_, value)| {
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|decoded| decoded.into_owned())
        })
}

/// Rejects requests without the shared bearer token.
///
/// The token is read from `Authorization: Bearer <token>`; WebSocket upgrades may pass it
/// as `?token=` instead.
pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = match bearer_token(request.headers()) {
        Some(token) => Some(token.to_string()),
        None if is_websocket_upgrade(request.headers()) => query_token(request.uri().query()),
        None => None,
    };

    let Some(presented) = presented else {
        tracing::debug!(path = %request.uri().path(), "Missing bearer token");
        return HttpAppError(AppError::Unauthorized(
            "Missing authorization header".to_string(),
        ))
        .into_response();
    };

    if !secure_compare(&presented, &auth_state.api_token) {
        tracing::warn!(path = %request.uri().path(), "Rejected invalid bearer token");
        return HttpAppError(AppError::Unauthorized("Invalid token".to_string())).into_response();
    }

    next.run(request).await
}
