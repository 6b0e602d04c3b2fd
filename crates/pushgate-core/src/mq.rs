//! Message queue clients and provider selection.
//!
//! Providers are registered by name and resolved once at startup into a
//! [`QueuePool`] of independent client instances. The pool hands out a
//! rotating starting instance per publish so failover spreads across
//! instances instead of hammering the first one.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{error::QueueError, failover::Retryable};

/// Name of the built-in bounded in-memory provider.
pub const MEMORY_PROVIDER: &str = "memory";

/// Name of the built-in provider that logs and drops every message.
pub const LOG_PROVIDER: &str = "log";

/// Queue topics this gateway publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Application frames accepted from bound sessions.
    DispatchMessage,
    /// Kick notices for sessions displaced on another node.
    RouterChange,
}

impl Topic {
    /// Broker-facing topic name.
    pub fn name(self) -> &'static str {
        match self {
            Self::DispatchMessage => "pushgate.dispatch.message",
            Self::RouterChange => "pushgate.router.change",
        }
    }

    /// Every topic.
    pub fn all() -> &'static [Topic] {
        &[Self::DispatchMessage, Self::RouterChange]
    }

    /// Check that every topic name is non-empty and unique.
    pub fn validate_all() -> Result<(), QueueError> {
        let mut seen = HashSet::new();
        for topic in Self::all() {
            let name = topic.name();
            if name.trim().is_empty() {
                return Err(QueueError::InvalidTopics(format!("{topic:?} has an empty name")));
            }
            if !seen.insert(name) {
                return Err(QueueError::InvalidTopics(format!("duplicate topic name {name}")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One connection to a queue broker.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Instance name for logs.
    fn name(&self) -> &str;

    /// Publish `payload` to `topic`.
    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), QueueError>;
}

/// Settings handed to a provider factory for each instance it builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Messages an instance buffers before refusing publishes.
    pub capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

/// Builds one client instance. Called with the instance index.
pub type QueueFactory =
    Arc<dyn Fn(usize, &QueueSettings) -> Result<Arc<dyn QueueClient>, QueueError> + Send + Sync>;

/// Name-to-factory table for queue providers.
#[derive(Clone, Default)]
pub struct QueueProviderRegistry {
    factories: HashMap<String, QueueFactory>,
}

impl QueueProviderRegistry {
    /// Registry with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `memory` and `log` providers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            MEMORY_PROVIDER,
            Arc::new(|index: usize, settings: &QueueSettings| {
                let client: Arc<dyn QueueClient> =
                    Arc::new(MemoryQueue::new(format!("memory-{index}"), settings.capacity));
                Ok::<_, QueueError>(client)
            }),
        );
        registry.register(
            LOG_PROVIDER,
            Arc::new(|index: usize, _: &QueueSettings| {
                let client: Arc<dyn QueueClient> = Arc::new(LogQueue::new(format!("log-{index}")));
                Ok::<_, QueueError>(client)
            }),
        );
        registry
    }

    /// Add or replace a provider.
    pub fn register(&mut self, name: impl Into<String>, factory: QueueFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build `instances` clients from the named provider.
    pub fn resolve(
        &self,
        name: &str,
        settings: &QueueSettings,
        instances: usize,
    ) -> Result<QueuePool, QueueError> {
        let factory =
            self.factories.get(name).ok_or_else(|| QueueError::UnknownProvider(name.to_owned()))?;

        let clients = (0..instances)
            .map(|index| factory(index, settings))
            .collect::<Result<Vec<_>, _>>()?;

        let pool = QueuePool::new(clients).ok_or_else(|| QueueError::NoInstances(name.to_owned()))?;
        info!(provider = name, instances = pool.len(), "queue provider resolved");
        Ok(pool)
    }
}

impl fmt::Debug for QueueProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueProviderRegistry").field("providers", &self.providers()).finish()
    }
}

/// Fixed set of client instances with a rotating starting point.
///
/// Cloning shares the instances and the rotation cursor.
#[derive(Clone)]
pub struct QueuePool {
    clients: Arc<[Arc<dyn QueueClient>]>,
    cursor: Arc<AtomicUsize>,
}

impl QueuePool {
    /// Pool over `clients`. `None` when empty.
    pub fn new(clients: Vec<Arc<dyn QueueClient>>) -> Option<Self> {
        if clients.is_empty() {
            return None;
        }
        Some(Self { clients: clients.into(), cursor: Arc::new(AtomicUsize::new(0)) })
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Always false; an empty pool cannot be built.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Advance the rotation and return the starting instance for one publish.
    pub fn next_start(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len()
    }

    /// Instance to use for `attempt` of a publish that started at `start`.
    pub fn client(&self, start: usize, attempt: u32) -> &Arc<dyn QueueClient> {
        &self.clients[(start + attempt as usize) % self.clients.len()]
    }
}

impl fmt::Debug for QueuePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.clients.iter().map(|client| client.name()).collect();
        f.debug_struct("QueuePool").field("clients", &names).finish()
    }
}

/// Bounded in-process queue.
///
/// Publishes never wait: a full queue fails with [`QueueError::Full`] so the
/// caller's failover can move on to another instance.
pub struct MemoryQueue {
    name: String,
    sender: mpsc::Sender<(Topic, Bytes)>,
    receiver: Mutex<mpsc::Receiver<(Topic, Bytes)>>,
}

impl MemoryQueue {
    /// Queue holding at most `capacity` messages.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self { name: name.into(), sender, receiver: Mutex::new(receiver) }
    }

    /// Take every buffered message in publish order.
    pub fn drain(&self) -> Vec<(Topic, Bytes)> {
        let mut receiver = self.receiver.lock();
        std::iter::from_fn(|| receiver.try_recv().ok()).collect()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), QueueError> {
        self.sender.try_send((topic, payload)).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => QueueError::Full { topic: topic.name().to_owned() },
            mpsc::error::TrySendError::Closed(_) => {
                QueueError::Unavailable(format!("{} is closed", self.name))
            },
        })
    }
}

impl fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQueue").field("name", &self.name).field("len", &self.len()).finish()
    }
}

/// Queue that logs each message and drops it.
#[derive(Debug)]
pub struct LogQueue {
    name: String,
}

impl LogQueue {
    /// Named log sink.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl QueueClient for LogQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), QueueError> {
        debug!(queue = %self.name, %topic, len = payload.len(), "message dropped by log queue");
        Ok(())
    }
}

impl Retryable for QueueError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Full { .. } | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_table_is_valid() {
        Topic::validate_all().unwrap();
        assert_eq!(Topic::DispatchMessage.to_string(), "pushgate.dispatch.message");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let registry = QueueProviderRegistry::with_builtin();
        let err = registry.resolve("kafka", &QueueSettings::default(), 2).unwrap_err();
        assert_eq!(err, QueueError::UnknownProvider("kafka".to_owned()));
    }

    #[test]
    fn zero_instances_is_rejected() {
        let registry = QueueProviderRegistry::with_builtin();
        let err = registry.resolve(MEMORY_PROVIDER, &QueueSettings::default(), 0).unwrap_err();
        assert_eq!(err, QueueError::NoInstances(MEMORY_PROVIDER.to_owned()));
    }

    #[test]
    fn builtin_providers_are_listed() {
        assert_eq!(QueueProviderRegistry::with_builtin().providers(), vec!["log", "memory"]);
    }

    #[test]
    fn pool_rotates_start_and_wraps_attempts() {
        let registry = QueueProviderRegistry::with_builtin();
        let pool = registry.resolve(LOG_PROVIDER, &QueueSettings::default(), 3).unwrap();

        assert_eq!(pool.next_start(), 0);
        assert_eq!(pool.next_start(), 1);
        assert_eq!(pool.client(2, 0).name(), "log-2");
        assert_eq!(pool.client(2, 1).name(), "log-0");
    }

    #[tokio::test]
    async fn memory_queue_reports_full() {
        let queue = MemoryQueue::new("q", 1);
        queue.publish(Topic::DispatchMessage, Bytes::from_static(b"a")).await.unwrap();

        let err = queue.publish(Topic::DispatchMessage, Bytes::from_static(b"b")).await;
        assert!(matches!(err, Err(QueueError::Full { .. })));
        assert!(err.unwrap_err().is_retryable());

        assert_eq!(queue.drain(), vec![(Topic::DispatchMessage, Bytes::from_static(b"a"))]);
        assert!(queue.is_empty());
    }
}
