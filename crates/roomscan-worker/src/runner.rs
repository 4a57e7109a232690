use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use roomscan_core::constants::OUTPUT_FILENAME;
use roomscan_core::{JobId, JobRecord, JobStatus, ProgressEvent};
use roomscan_processing::{Converter, ConverterError};
use roomscan_storage::hash::sha256_file;
use roomscan_storage::{JobStore, StorageError, StorageResult};
use tokio::sync::mpsc;

use crate::progress_hub::ProgressHub;
use crate::queue::JobHandler;

const NO_OUTPUT_REASON: &str = "converter produced no output";

/// Runs one job through the converter, persisting every state change before
/// publishing it.
#[derive(Clone)]
pub struct ConversionRunner {
    store: JobStore,
    converter: Arc<dyn Converter>,
    hub: ProgressHub,
}

impl ConversionRunner {
    pub fn new(store: JobStore, converter: Arc<dyn Converter>, hub: ProgressHub) -> Self {
        Self {
            store,
            converter,
            hub,
        }
    }

    async fn persist(&self, record: &mut JobRecord) -> StorageResult<()> {
        record.touch();
        self.store.save(record).await?;
        self.hub.publish(ProgressEvent::from(&*record));
        Ok(())
    }

    /// Persist and publish a converter percentage if it moves progress forward.
    ///
    /// Progress is telemetry: a failed save is logged and the conversion goes on.
    async fn record_progress(&self, record: &mut JobRecord, percent: u8) {
        let percent = percent.min(100);
        if percent <= record.progress {
            return;
        }
        record.progress = percent;
        if let Err(e) = self.persist(record).await {
            tracing::warn!(progress = percent, error = %e, "Failed to persist progress");
        }
    }

    #[tracing::instrument(skip(self), fields(job_id = %id, converter = %self.converter.name()))]
    async fn run(&self, id: &JobId) -> StorageResult<()> {
        let start = Instant::now();
        let mut record = self.store.load(id).await?;
        if record.status.is_terminal() {
            tracing::debug!(status = %record.status, "Skipping finished job");
            return Ok(());
        }

        let outcome = match self.paths(&record) {
            Ok((input, output)) => {
                record.status = JobStatus::Processing;
                match self.persist(&mut record).await {
                    Err(e @ StorageError::NotFound(_)) => return Err(e),
                    Err(e) => tracing::warn!(error = %e, "Failed to persist processing status"),
                    Ok(()) => {}
                }
                tracing::info!("Conversion started");
                self.convert(&mut record, &input, &output).await
            }
            Err(e) => {
                tracing::error!(error = %e, "Job record has no usable input");
                Err("conversion failed".to_string())
            }
        };

        self.finish(&mut record, outcome).await?;

        tracing::info!(
            status = %record.status,
            error = record.error.as_deref().unwrap_or(""),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Conversion finished"
        );
        Ok(())
    }

    fn paths(&self, record: &JobRecord) -> StorageResult<(PathBuf, PathBuf)> {
        let input_name = record.input_file.as_deref().ok_or_else(|| {
            StorageError::Corrupt(format!("{} has no stored input", record.id))
        })?;
        let input = self.store.input_path(&record.id, input_name)?;
        let output = self.store.artifact_path(&record.id)?;
        Ok((input, output))
    }

    /// Record the terminal state: input removed, progress 100, final save attempted.
    async fn finish(
        &self,
        record: &mut JobRecord,
        outcome: Result<String, String>,
    ) -> StorageResult<()> {
        match outcome {
            Ok(hash) => {
                record.status = JobStatus::Done;
                record.output_file = Some(OUTPUT_FILENAME.to_string());
                record.hash = Some(hash);
                record.error = None;
            }
            Err(reason) => {
                if let Ok(output) = self.store.artifact_path(&record.id) {
                    if let Err(e) = tokio::fs::remove_file(&output).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            tracing::warn!(error = %e, "Failed to remove partial output");
                        }
                    }
                }
                record.status = JobStatus::Error;
                record.output_file = None;
                record.hash = None;
                record.error = Some(reason);
            }
        }

        if let Err(e) = self.store.remove_input(record).await {
            tracing::warn!(error = %e, "Failed to remove conversion input");
        }
        record.input_file = None;
        record.progress = 100;
        self.persist(record).await
    }

    /// Drive the converter to completion while forwarding its progress.
    ///
    /// Returns the artifact hash, or the reason stored on the failed job.
    async fn convert(
        &self,
        record: &mut JobRecord,
        input: &Path,
        output: &Path,
    ) -> Result<String, String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conversion = self.converter.convert(input, output, tx);
        tokio::pin!(conversion);

        let result = loop {
            tokio::select! {
                result = &mut conversion => break result,
                Some(percent) = rx.recv() => self.record_progress(record, percent).await,
            }
        };
        while let Ok(percent) = rx.try_recv() {
            self.record_progress(record, percent).await;
        }

        self.outcome(result, output).await
    }

    async fn outcome(
        &self,
        result: Result<(), ConverterError>,
        output: &Path,
    ) -> Result<String, String> {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Converter failed");
            return Err(e.job_reason());
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(NO_OUTPUT_REASON.to_string()),
        }

        sha256_file(output).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to hash converter output");
            "conversion failed".to_string()
        })
    }
}

#[async_trait]
impl JobHandler for ConversionRunner {
    async fn handle(&self, id: JobId) {
        match self.run(&id).await {
            Ok(()) => {}
            // The job was deleted while it waited or ran.
            Err(StorageError::NotFound(_)) => {
                tracing::info!(job_id = %id, "Job removed before conversion finished");
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Conversion job failed");
            }
        }
    }
}
