//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod services;

use anyhow::{Context, Result};
use roomscan_core::Config;
use roomscan_processing::{CommandConverter, Converter};
use std::sync::Arc;
use std::time::Duration;

pub use services::{initialize_services, Services};

/// Validate configuration, check the converter, and build services and router.
pub async fn initialize_app(config: &Config) -> Result<(Services, axum::Router)> {
    config
        .validate()
        .context("Configuration validation failed")?;
    tracing::info!(environment = %config.environment, "Configuration loaded and validated successfully");

    let converter = CommandConverter::from_config(config).context("Invalid converter settings")?;
    let probe_timeout = Duration::from_secs(config.converter_probe_timeout_secs);
    let version = converter
        .probe(probe_timeout)
        .await
        .with_context(|| format!("Converter '{}' is not usable", converter.name()))?;
    tracing::info!(converter = %converter.name(), version = %version, "Converter available");

    let services = initialize_services(config, Arc::new(converter)).await?;
    let router = routes::setup_routes(config, services.state.clone())?;

    Ok((services, router))
}
