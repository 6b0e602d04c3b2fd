//! Queue client that records publishes and can refuse them.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pushgate_core::{QueueClient, QueueError, Topic};
use tracing::trace;

/// How a [`RecordingQueue`] answers publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Accept everything.
    Healthy,
    /// Refuse everything with a retryable error.
    Down,
    /// Refuse everything with a non-retryable error.
    Broken,
}

/// Queue client recording accepted messages and counting every attempt.
#[derive(Debug)]
pub struct RecordingQueue {
    name: String,
    mode: Mutex<FailMode>,
    attempts: AtomicUsize,
    published: Mutex<Vec<(Topic, Bytes)>>,
}

impl RecordingQueue {
    /// Healthy queue named `name`.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            mode: Mutex::new(FailMode::Healthy),
            attempts: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        })
    }

    /// Change how publishes are answered.
    pub fn set_mode(&self, mode: FailMode) {
        *self.mode.lock() = mode;
    }

    /// Publishes attempted, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted messages in order.
    pub fn published(&self) -> Vec<(Topic, Bytes)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl QueueClient for RecordingQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock();
        trace!(queue = %self.name, %topic, ?mode, "publish");
        match mode {
            FailMode::Healthy => {
                self.published.lock().push((topic, payload));
                Ok(())
            },
            FailMode::Down => Err(QueueError::Unavailable(format!("{} is down", self.name))),
            FailMode::Broken => Err(QueueError::InvalidTopics(format!("{} rejects {topic}", self.name))),
        }
    }
}
