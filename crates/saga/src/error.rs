//! Saga error types.

use common::OrderId;
use domain::{CompensationStep, DomainError, Step};
use store::StoreError;
use task_queue::QueueError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step identifier with no registered operation.
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// The ledger already holds a failed outcome for this step.
    #[error("Step '{step}' previously failed for order {order_id}")]
    StepPreviouslyFailed { order_id: OrderId, step: Step },

    /// A forward step failed; compensation has been triggered.
    #[error("Saga step '{step}' failed for order {order_id}: {reason}")]
    StepFailed {
        order_id: OrderId,
        step: Step,
        reason: String,
    },

    /// A compensation step failed.
    #[error("Compensation step '{step}' failed for order {order_id}: {reason}")]
    CompensationFailed {
        order_id: OrderId,
        step: CompensationStep,
        reason: String,
    },

    /// Slot service error.
    #[error("Slot service error: {0}")]
    SlotService(String),

    /// Agent service error.
    #[error("Agent service error: {0}")]
    AgentService(String),

    /// Notification service error.
    #[error("Notification service error: {0}")]
    NotificationService(String),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Workflow state not found.
    #[error("Workflow not found for order {0}")]
    WorkflowNotFound(OrderId),

    /// Saga has already been started for the order.
    #[error("Saga already started for order {0}")]
    AlreadyStarted(OrderId),

    /// Chaos probability outside [0, 1].
    #[error("Chaos probability must be within [0, 1], got {0}")]
    InvalidChaosProbability(f64),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl SagaError {
    /// Returns true if redelivering the same task can succeed.
    ///
    /// Only infrastructure failures qualify; every other error is either a
    /// settled business outcome or a bug that a retry would repeat.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SagaError::Store(_) | SagaError::Queue(_))
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
