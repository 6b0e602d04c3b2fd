//! Server error types.

use pushgate_core::QueueError;
use thiserror::Error;

/// Errors that stop the server from starting or running.
///
/// Per-connection failures never surface here; they close the affected
/// connection and are logged.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Listener I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Queue provider could not be resolved.
    #[error("queue setup failed: {0}")]
    Queue(#[from] QueueError),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ServerError>;
