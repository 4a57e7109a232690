//! Per-job progress fan-out
//!
//! Each job with at least one live subscriber owns a broadcast channel. Publishing to a
//! job nobody listens to is a no-op, and a terminal event closes the job's channel so
//! subscribers see the final event followed by end-of-stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use roomscan_core::{JobId, ProgressEvent};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

struct Entry {
    sender: broadcast::Sender<ProgressEvent>,
    /// Identifies the channel generation so a stale subscription never removes a newer one.
    token: u64,
}

#[derive(Clone)]
pub struct ProgressHub {
    channels: Arc<Mutex<HashMap<JobId, Entry>>>,
    next_token: Arc<AtomicU64>,
    capacity: usize,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<JobId, Entry>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start receiving events for `id`.
    pub fn subscribe(&self, id: &JobId) -> ProgressSubscription {
        let mut channels = self.channels();
        let entry = channels.entry(id.clone()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(self.capacity);
            Entry {
                sender,
                token: self.next_token.fetch_add(1, Ordering::Relaxed),
            }
        });

        ProgressSubscription {
            id: id.clone(),
            token: entry.token,
            receiver: entry.sender.subscribe(),
            hub: self.clone(),
        }
    }

    /// Deliver `event` to current subscribers of its job.
    pub fn publish(&self, event: ProgressEvent) {
        let mut channels = self.channels();
        let terminal = event.is_terminal();
        let Some(entry) = channels.get(&event.id) else {
            return;
        };

        // No receivers left is fine; the entry is reaped below or by the last subscriber.
        let _ = entry.sender.send(event.clone());
        tracing::trace!(job_id = %event.id, progress = event.progress, status = %event.status, "Published progress");

        if terminal {
            channels.remove(&event.id);
        }
    }

    /// Jobs that currently have a channel.
    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    fn release(&self, id: &JobId, token: u64) {
        let mut channels = self.channels();
        if let Some(entry) = channels.get(id) {
            // The dropping subscription still holds its receiver here.
            if entry.token == token && entry.sender.receiver_count() <= 1 {
                channels.remove(id);
            }
        }
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A live subscription to one job's progress. Unsubscribes on drop.
pub struct ProgressSubscription {
    id: JobId,
    token: u64,
    receiver: broadcast::Receiver<ProgressEvent>,
    hub: ProgressHub,
}

impl ProgressSubscription {
    pub fn job_id(&self) -> &JobId {
        &self.id
    }

    /// Next event, or `None` once the job's channel has closed.
    ///
    /// A subscriber that falls behind skips the missed intermediate events; progress is
    /// a level, not a log, so only the latest value matters.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(job_id = %self.id, skipped = skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.hub.release(&self.id, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomscan_core::JobStatus;

    fn event(id: &JobId, status: JobStatus, progress: u8) -> ProgressEvent {
        ProgressEvent {
            id: id.clone(),
            status,
            progress,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order_then_close() {
        let hub = ProgressHub::default();
        let id = JobId::generate();
        let mut a = hub.subscribe(&id);
        let mut b = hub.subscribe(&id);

        hub.publish(event(&id, JobStatus::Processing, 10));
        hub.publish(event(&id, JobStatus::Processing, 40));
        hub.publish(event(&id, JobStatus::Done, 100));

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().progress, 10);
            assert_eq!(sub.recv().await.unwrap().progress, 40);
            assert_eq!(sub.recv().await.unwrap().status, JobStatus::Done);
            assert!(sub.recv().await.is_none());
        }
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = ProgressHub::default();
        let id = JobId::generate();
        hub.publish(event(&id, JobStatus::Processing, 5));
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_events_are_scoped_to_their_job() {
        let hub = ProgressHub::default();
        let a_id = JobId::generate();
        let b_id = JobId::generate();
        let mut a = hub.subscribe(&a_id);
        let b = hub.subscribe(&b_id);
        assert_eq!(a.job_id(), &a_id);
        assert_eq!(b.job_id(), &b_id);

        hub.publish(event(&b_id, JobStatus::Processing, 70));
        hub.publish(event(&a_id, JobStatus::Error, 100));

        let got = a.recv().await.unwrap();
        assert_eq!(got.id, a_id);
        assert_eq!(got.status, JobStatus::Error);
        assert!(a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_last_subscriber_drop_removes_channel() {
        let hub = ProgressHub::default();
        let id = JobId::generate();
        let a = hub.subscribe(&id);
        let b = hub.subscribe(&id);
        assert_eq!(hub.channel_count(), 1);

        drop(a);
        assert_eq!(hub.channel_count(), 1);
        drop(b);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_subscription_keeps_newer_channel() {
        let hub = ProgressHub::default();
        let id = JobId::generate();
        let old = hub.subscribe(&id);
        hub.publish(event(&id, JobStatus::Done, 100));

        let mut fresh = hub.subscribe(&id);
        drop(old);
        assert_eq!(hub.channel_count(), 1);

        hub.publish(event(&id, JobStatus::Error, 100));
        assert_eq!(fresh.recv().await.unwrap().status, JobStatus::Error);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_to_latest() {
        let hub = ProgressHub::new(2);
        let id = JobId::generate();
        let mut sub = hub.subscribe(&id);

        for p in 1..=5 {
            hub.publish(event(&id, JobStatus::Processing, p * 10));
        }

        assert_eq!(sub.recv().await.unwrap().progress, 40);
        assert_eq!(sub.recv().await.unwrap().progress, 50);
    }
}
