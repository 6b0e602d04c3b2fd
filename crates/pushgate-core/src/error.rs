//! Error types for core collaborators.
//!
//! None of these reach a client. [`crate::router::RouterCenter`] and
//! [`crate::dispatch::DispatchPipeline`] log and absorb them so one failing
//! collaborator never tears down a connection's read path.

use thiserror::Error;

/// Shared cache failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Cache backend could not be reached or refused the operation.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Id generation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdGenError {
    /// The namespace has handed out its last id.
    #[error("id space exhausted for namespace {namespace}")]
    Exhausted {
        /// Namespace that ran out.
        namespace: String,
    },

    /// Generator backend is unavailable.
    #[error("id generator unavailable: {0}")]
    Unavailable(String),
}

/// Queue client and provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No provider registered under this name.
    #[error("unknown queue provider: {0}")]
    UnknownProvider(String),

    /// Provider resolved to zero client instances.
    #[error("queue provider {0} produced no instances")]
    NoInstances(String),

    /// Queue instance is full.
    #[error("queue full on topic {topic}")]
    Full {
        /// Topic name the publish targeted.
        topic: String,
    },

    /// Broker is unreachable or rejected the publish.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// Topic table failed startup validation.
    #[error("invalid topic table: {0}")]
    InvalidTopics(String),
}

/// Session table failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Underlying cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Cached route record could not be encoded or decoded.
    #[error("route record codec: {0}")]
    Codec(String),
}
