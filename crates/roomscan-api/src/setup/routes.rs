//! Route configuration and setup

use crate::auth::{auth_middleware, AuthState};
use crate::constants::{API_PREFIX, MULTIPART_OVERHEAD_BYTES};
use crate::handlers;
use crate::middleware::{rate_limit_middleware, security_headers_middleware, HttpRateLimiter};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use roomscan_core::Config;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;
    let auth_state = Arc::new(AuthState::new(config.api_token.clone()));
    let rate_limiter = Arc::new(HttpRateLimiter::new(
        config.rate_limit_max,
        Duration::from_secs(config.rate_limit_window_secs),
    ));

    tracing::info!(
        rate_limit_max = config.rate_limit_max,
        rate_limit_window_secs = config.rate_limit_window_secs,
        "HTTP rate limiting enabled"
    );

    let protected = protected_routes(config).layer(axum::middleware::from_fn_with_state(
        auth_state,
        auth_middleware,
    ));

    let app = public_routes()
        .merge(protected)
        .merge(utoipa_rapidoc::RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(cors)
        .layer(ConcurrencyLimitLayer::new(config.http_concurrency_limit))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ))
        .with_state(state);

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}

/// Public routes (no authentication required)
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
}

/// Protected routes (require the bearer token).
fn protected_routes(config: &Config) -> Router<Arc<AppState>> {
    let scans = format!("{}/scans", API_PREFIX);

    Router::new()
        .merge(upload_routes(config, &scans))
        .route(&scans, get(handlers::scan_get::list_scans))
        .route(
            &format!("{}/{{id}}", scans),
            get(handlers::scan_get::get_scan_status).delete(handlers::scan_delete::delete_scan),
        )
        .route(
            &format!("{}/{{id}}/info", scans),
            get(handlers::scan_get::get_scan_info),
        )
        .route(
            &format!("{}/{{id}}/room.glb", scans),
            get(handlers::scan_artifact::download_artifact),
        )
        .route(
            &format!("{}/{{id}}/events", scans),
            get(handlers::scan_events::scan_events),
        )
}

/// The upload route, with its own body limit.
fn upload_routes(config: &Config, path: &str) -> Router<Arc<AppState>> {
    // The handler enforces the exact file limit while streaming; this cap only bounds
    // the whole request.
    let upload_body_limit = config
        .max_upload_bytes
        .saturating_add(config.max_meta_bytes as u64)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let upload_body_limit = usize::try_from(upload_body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route(path, post(handlers::scan_upload::upload_scan))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_body_limit))
}
