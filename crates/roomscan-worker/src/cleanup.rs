use std::sync::Arc;
use std::time::{Duration, SystemTime};

use roomscan_storage::{JobStore, ScratchArea, StorageError};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::queue::JobQueue;

/// How aggressively the scratch area is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Startup and shutdown: no upload can be in flight, clear everything.
    Full,
    /// Scheduled: keep scratch entries younger than the grace period.
    Periodic,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub jobs_removed: usize,
    pub scratch_removed: usize,
    pub errors: usize,
}

/// Removes expired job directories and stale upload scratch files.
pub struct RetentionSweeper {
    store: JobStore,
    scratch: ScratchArea,
    queue: JobQueue,
    retention: Duration,
    scratch_grace: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: JobStore,
        scratch: ScratchArea,
        queue: JobQueue,
        retention: Duration,
        scratch_grace: Duration,
    ) -> Self {
        Self {
            store,
            scratch,
            queue,
            retention,
            scratch_grace,
        }
    }

    /// Run the sweep every `every` until `shutdown` fires.
    /// The first tick is skipped; startup runs its own full sweep.
    pub fn start(
        self: Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(every);
            sweep_interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sweep_interval.tick() => {}
                }

                tracing::info!("Starting scheduled retention sweep");
                let report = self.sweep(SweepMode::Periodic).await;
                if report.errors > 0 {
                    tracing::error!(errors = report.errors, "Retention sweep finished with errors");
                }
            }

            tracing::debug!("Retention sweeper stopped");
        })
    }

    /// Remove expired jobs and scratch entries. Individual failures are logged and counted.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, mode: SweepMode) -> SweepReport {
        let mut report = SweepReport::default();

        match self.sweep_jobs(&mut report).await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to list jobs for retention sweep");
                report.errors += 1;
            }
        }

        let min_age = match mode {
            SweepMode::Full => None,
            SweepMode::Periodic => Some(self.scratch_grace),
        };
        match self.scratch.clear(min_age).await {
            Ok(count) => report.scratch_removed = count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to clear upload scratch area");
                report.errors += 1;
            }
        }

        tracing::info!(
            jobs_removed = report.jobs_removed,
            scratch_removed = report.scratch_removed,
            errors = report.errors,
            mode = ?mode,
            "Retention sweep completed"
        );
        report
    }

    async fn sweep_jobs(&self, report: &mut SweepReport) -> Result<(), anyhow::Error> {
        let now = SystemTime::now();

        for (id, modified) in self.store.list_with_mtime().await? {
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= self.retention {
                continue;
            }
            if self.queue.is_active(&id) {
                tracing::debug!(job_id = %id, "Skipping expired job that is still queued");
                continue;
            }

            tracing::info!(job_id = %id, age_secs = age.as_secs(), "Deleting expired job");
            match self.store.delete(&id).await {
                Ok(()) => report.jobs_removed += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to delete expired job");
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }
}
