//! Bounded conversion queue
//!
//! Admission is two-phase so an upload is never half accepted: a handler first
//! reserves a [`QueueSlot`] (rejected immediately when pending + running would exceed
//! the configured depth), does its own persistence, and only then submits the job id.
//! Dropping an unused slot gives the capacity back.
//!
//! A single dispatcher takes ids in admission order and waits on a fair semaphore
//! for one of `concurrency` worker permits, which keeps execution FIFO.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use roomscan_core::JobId;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Work executed for each admitted job.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, id: JobId);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Conversion queue is full ({depth}/{max_depth})")]
    Full {
        depth: usize,
        max_depth: usize,
        retry_after_secs: u64,
    },

    #[error("Conversion queue is shutting down")]
    Closed,

    #[error("Job {0} is already queued")]
    AlreadyActive(JobId),
}

struct Inner {
    tx: mpsc::UnboundedSender<JobId>,
    /// Pending plus running jobs, including reserved slots.
    depth: AtomicUsize,
    running: AtomicUsize,
    max_depth: usize,
    retry_after_secs: u64,
    closed: AtomicBool,
    active: Mutex<HashSet<JobId>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Inner {
    fn release(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    fn active(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears a job's bookkeeping when its run ends, even if the handler panicked.
struct RunGuard {
    inner: Arc<Inner>,
    id: JobId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.active().remove(&self.id);
        self.inner.running.fetch_sub(1, Ordering::SeqCst);
        self.inner.release();
    }
}

#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    /// Create the queue and spawn its dispatcher.
    ///
    /// # Arguments
    /// * `handler` - Work run for each admitted job
    /// * `concurrency` - Maximum number of jobs running at once (at least 1)
    /// * `max_depth` - Maximum pending + running jobs (at least 1)
    /// * `retry_after_secs` - Hint returned to rejected clients
    pub fn start(
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        max_depth: usize,
        retry_after_secs: u64,
    ) -> Self {
        let concurrency = concurrency.max(1);
        let max_depth = max_depth.max(1);
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            tx,
            depth: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_depth,
            retry_after_secs,
            closed: AtomicBool::new(false),
            active: Mutex::new(HashSet::new()),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Self::dispatch(inner.clone(), rx, handler, concurrency));

        tracing::info!(
            concurrency = concurrency,
            max_depth = max_depth,
            "Conversion queue initialized"
        );

        Self { inner }
    }

    /// Reserve capacity for one job, or reject immediately.
    pub fn try_reserve(&self) -> Result<QueueSlot, QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let max_depth = self.inner.max_depth;
        self.inner
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                (depth < max_depth).then_some(depth + 1)
            })
            .map_err(|depth| {
                tracing::warn!(depth = depth, max_depth = max_depth, "Conversion queue is full, rejecting job");
                QueueError::Full {
                    depth,
                    max_depth,
                    retry_after_secs: self.inner.retry_after_secs,
                }
            })?;

        Ok(QueueSlot {
            inner: Some(self.inner.clone()),
        })
    }

    /// Pending plus running jobs, including reserved slots.
    pub fn depth(&self) -> usize {
        self.inner.depth.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn max_depth(&self) -> usize {
        self.inner.max_depth
    }

    /// Whether a job is queued or running.
    pub fn is_active(&self, id: &JobId) -> bool {
        self.inner.active().contains(id)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop admitting and dispatching new work. Running jobs continue.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(
                running = self.running(),
                depth = self.depth(),
                "Conversion queue closed"
            );
        }
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
    }

    /// Close the queue and wait up to `grace` for running jobs.
    ///
    /// Returns `false` if jobs were still running when the grace period ran out; those
    /// are abandoned, and jobs never started stay pending until the next startup marks
    /// them failed.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.close();
        let finished = tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok();
        if !finished {
            tracing::warn!(
                running = self.running(),
                grace_secs = grace.as_secs(),
                "Abandoning running conversions after grace period"
            );
        }
        finished
    }

    async fn dispatch(
        inner: Arc<Inner>,
        mut rx: mpsc::UnboundedReceiver<JobId>,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
    ) {
        let semaphore = Arc::new(Semaphore::new(concurrency));

        loop {
            let id = tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            inner.running.fetch_add(1, Ordering::SeqCst);
            let guard = RunGuard {
                inner: inner.clone(),
                id: id.clone(),
            };
            let handler = handler.clone();

            inner.tracker.spawn(async move {
                let _permit = permit;
                let _guard = guard;
                let start = Instant::now();
                tracing::debug!(job_id = %id, "Conversion job started");
                handler.handle(id.clone()).await;
                tracing::debug!(
                    job_id = %id,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Conversion job finished"
                );
            });
        }

        tracing::debug!("Conversion dispatcher stopped");
    }
}

/// Reserved queue capacity. Released on drop unless submitted.
pub struct QueueSlot {
    inner: Option<Arc<Inner>>,
}

impl QueueSlot {
    /// Enqueue `id` using this reservation.
    #[tracing::instrument(skip(self), fields(job_id = %id))]
    pub fn submit(mut self, id: JobId) -> Result<(), QueueError> {
        let Some(inner) = self.inner.take() else {
            return Err(QueueError::Closed);
        };

        if inner.closed.load(Ordering::SeqCst) {
            inner.release();
            return Err(QueueError::Closed);
        }

        if !inner.active().insert(id.clone()) {
            inner.release();
            return Err(QueueError::AlreadyActive(id));
        }

        if inner.tx.send(id.clone()).is_err() {
            inner.active().remove(&id);
            inner.release();
            return Err(QueueError::Closed);
        }

        tracing::info!(job_id = %id, depth = inner.depth.load(Ordering::SeqCst), "Enqueued conversion job");
        Ok(())
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}
