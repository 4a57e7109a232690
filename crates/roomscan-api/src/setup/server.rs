//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use roomscan_core::Config;
use roomscan_worker::SweepMode;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Services;

/// Serve until a shutdown signal, then drain conversions and sweep once more.
pub async fn start_server(config: &Config, app: Router, services: Services) -> Result<()> {
    let Services { state, sweeper } = services;

    sweeper.sweep(SweepMode::Full).await;
    let background = CancellationToken::new();
    let sweeper_handle = sweeper.clone().start(
        Duration::from_secs(config.sweep_interval_secs),
        background.clone(),
    );

    let addr = format!("0.0.0.0:{}", config.server_port);
    tracing::info!(addr = %addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        max_upload_bytes = config.max_upload_bytes,
        queue_concurrency = config.queue_concurrency,
        queue_max_depth = config.queue_max_depth,
        retention_hours = config.retention_hours,
        converter = %config.converter_path,
        "Server ready and accepting connections"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    background.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::warn!(error = %e, "Retention sweeper task ended abnormally");
    }

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if state.queue.drain(grace).await {
        tracing::info!("All conversions finished");
    }
    sweeper.sweep(SweepMode::Full).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
