//! In-process job queue on a bounded channel.

use std::collections::HashSet;

use sgen_models::JobId;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};

pub const DEFAULT_CAPACITY: usize = 100;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Ids buffered before producers wait
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            capacity: std::env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(DEFAULT_CAPACITY),
        }
    }
}

/// Bounded FIFO of job ids with a cancellation set.
#[derive(Debug)]
pub struct JobQueue {
    sender: RwLock<Option<mpsc::Sender<JobId>>>,
    receiver: Mutex<mpsc::Receiver<JobId>>,
    canceled: RwLock<HashSet<JobId>>,
    capacity: usize,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: RwLock::new(Some(tx)),
            receiver: Mutex::new(rx),
            canceled: RwLock::new(HashSet::new()),
            capacity,
        }
    }

    pub fn from_env() -> Self {
        Self::new(QueueConfig::from_env())
    }

    /// Enqueue `id`, waiting while the queue is full.
    pub async fn push(&self, id: JobId) -> QueueResult<()> {
        // Clone so the lock is not held while waiting for capacity
        let sender = self.sender.read().await.clone().ok_or(QueueError::Closed)?;
        sender.send(id.clone()).await.map_err(|_| QueueError::Closed)?;
        debug!(job_id = %id, "Enqueued job");
        Ok(())
    }

    /// Wait for the next id. `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<JobId> {
        self.receiver.lock().await.recv().await
    }

    /// Record a cancellation request for `id`.
    pub async fn cancel(&self, id: &JobId) {
        info!(job_id = %id, "Cancellation requested");
        self.canceled.write().await.insert(id.clone());
    }

    pub async fn is_canceled(&self, id: &JobId) -> bool {
        self.canceled.read().await.contains(id)
    }

    /// Forget the cancellation flag once the job reached a terminal state.
    pub async fn clear(&self, id: &JobId) {
        self.canceled.write().await.remove(id);
    }

    /// Stop accepting ids. Buffered ids can still be popped.
    pub async fn close(&self) {
        if self.sender.write().await.take().is_some() {
            info!("Job queue closed");
        }
    }

    /// Ids currently buffered.
    pub async fn len(&self) -> usize {
        match self.sender.read().await.as_ref() {
            Some(sender) => self.capacity - sender.capacity(),
            None => 0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn id(s: &str) -> JobId {
        JobId::from_string(s)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::new(QueueConfig { capacity: 4 });
        tokio_test::assert_ok!(queue.push(id("a")).await);
        tokio_test::assert_ok!(queue.push(id("b")).await);
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.pop().await, Some(id("a")));
        assert_eq!(queue.pop().await, Some(id("b")));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let queue = Arc::new(JobQueue::new(QueueConfig { capacity: 1 }));
        queue.push(id("a")).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(id("b")).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.pop().await, Some(id("a")));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.pop().await, Some(id("b")));
    }

    #[tokio::test]
    async fn test_cancel_flags() {
        let queue = JobQueue::new(QueueConfig::default());
        assert!(!queue.is_canceled(&id("a")).await);

        queue.cancel(&id("a")).await;
        assert!(queue.is_canceled(&id("a")).await);
        assert!(!queue.is_canceled(&id("b")).await);

        queue.clear(&id("a")).await;
        assert!(!queue.is_canceled(&id("a")).await);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = JobQueue::new(QueueConfig { capacity: 2 });
        queue.push(id("a")).await.unwrap();
        queue.close().await;

        assert!(matches!(queue.push(id("b")).await, Err(QueueError::Closed)));
        assert_eq!(queue.pop().await, Some(id("a")));
        assert_eq!(queue.pop().await, None);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let queue = JobQueue::new(QueueConfig { capacity: 0 });
        assert_eq!(queue.capacity(), 1);
    }
}
