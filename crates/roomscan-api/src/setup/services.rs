//! Storage, queue and background service wiring

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use roomscan_core::Config;
use roomscan_processing::{Converter, FileTypeValidator};
use roomscan_storage::{JobStore, ScratchArea};
use roomscan_worker::{ConversionRunner, JobQueue, ProgressHub, RetentionSweeper};

use crate::state::AppState;

/// Everything the server needs beyond the router.
pub struct Services {
    pub state: Arc<AppState>,
    pub sweeper: Arc<RetentionSweeper>,
}

/// Open storage, recover interrupted jobs, and start the conversion queue.
pub async fn initialize_services(
    config: &Config,
    converter: Arc<dyn Converter>,
) -> Result<Services> {
    let store = JobStore::open(&config.storage_dir)
        .await
        .context("Failed to open job storage")?;
    let scratch = ScratchArea::open(&config.upload_dir)
        .await
        .context("Failed to open upload scratch area")?;

    let recovered = store
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted jobs")?;

    let hub = ProgressHub::default();
    let runner = ConversionRunner::new(store.clone(), converter, hub.clone());
    let queue = JobQueue::start(
        Arc::new(runner),
        config.queue_concurrency,
        config.queue_max_depth,
        config.queue_retry_after_secs,
    );
    tracing::info!(
        concurrency = config.queue_concurrency,
        max_depth = queue.max_depth(),
        "Conversion queue started"
    );

    let sweeper = Arc::new(RetentionSweeper::new(
        store.clone(),
        scratch.clone(),
        queue.clone(),
        config.retention(),
        Duration::from_secs(config.scratch_grace_secs),
    ));

    if config.skip_filetype_check {
        tracing::warn!("SKIP_FILETYPE_CHECK set: uploads are not content-sniffed");
    }

    tracing::info!(
        storage_dir = %store.root().display(),
        upload_dir = %scratch.dir().display(),
        recovered_jobs = recovered,
        "Storage initialized"
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        scratch,
        queue,
        hub,
        validator: FileTypeValidator::new(config.skip_filetype_check),
    });

    Ok(Services { state, sweeper })
}
