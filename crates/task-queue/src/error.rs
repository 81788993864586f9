//! Queue error types.

use thiserror::Error;

/// Errors raised by the queue itself.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The consuming side of the queue is gone.
    #[error("Task queue is closed")]
    Closed,

    /// The queue refused the task.
    #[error("Task queue unavailable: {0}")]
    Unavailable(String),

    /// The consuming side was already handed to a worker pool.
    #[error("Task queue already has a consumer")]
    AlreadyConsumed,

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Error returned by a task handler.
///
/// `retryable` tells the worker pool whether redelivering the same task can
/// succeed; non-retryable errors are logged and the task is dropped.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub retryable: bool,
}

impl HandlerError {
    /// A failure worth redelivering with backoff.
    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure redelivery cannot fix.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}
