use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{DedupeKey, Order, StepResult, WorkflowState};

use crate::{Result, StoreError};

/// Outcome of a ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This call created the record.
    Recorded,
    /// A record already existed for the key; it was left untouched.
    AlreadyRecorded(StepResult),
}

/// Storage for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts an order unless one with the same ID exists.
    ///
    /// Returns false, leaving the stored order untouched, if it already
    /// existed. The check and the insert are a single atomic operation.
    async fn create_order(&self, order: &Order) -> Result<bool>;

    /// Inserts or updates an order, keyed by its ID.
    async fn save_order(&self, order: &Order) -> Result<()>;

    /// Loads an order. Returns None if it doesn't exist.
    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>>;
}

/// Storage for workflow states, one per order.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Inserts or updates the workflow state of an order (last write wins).
    async fn save_workflow_state(&self, state: &WorkflowState) -> Result<()>;

    /// Loads the workflow state of an order. Returns None if it doesn't exist.
    async fn get_workflow_state(&self, order_id: &OrderId) -> Result<Option<WorkflowState>>;

    /// Returns every pending workflow not updated within `timeout`,
    /// oldest first.
    async fn get_stalled_workflows(&self, timeout: Duration) -> Result<Vec<WorkflowState>>;
}

/// Append-only idempotency ledger of step outcomes.
#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    /// Returns the recorded outcome for `key`, if any.
    async fn is_executed(&self, key: &DedupeKey) -> Result<Option<StepResult>>;

    /// Records `result` under `key` unless a record already exists.
    ///
    /// The check and the insert are a single atomic operation: of two
    /// concurrent writers for the same key exactly one gets
    /// [`RecordOutcome::Recorded`].
    async fn save_execution(&self, key: &DedupeKey, result: StepResult) -> Result<RecordOutcome>;
}

/// Storage for agents assigned to orders.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Assigns an agent to an order. Assigning the same agent twice is a no-op.
    async fn assign_agent(&self, order_id: &OrderId, agent_id: &str) -> Result<()>;

    /// Returns the agents assigned to an order, in assignment order.
    async fn get_agents_by_order_id(&self, order_id: &OrderId) -> Result<Vec<String>>;

    /// Removes every agent assigned to an order.
    async fn unassign_agents(&self, order_id: &OrderId) -> Result<()>;
}

/// Everything the saga engine needs from persistence.
pub trait SagaStore: OrderRepository + WorkflowRepository + ExecutionLedger + AgentRepository {}

impl<T> SagaStore for T where
    T: OrderRepository + WorkflowRepository + ExecutionLedger + AgentRepository
{
}

/// Returns the instant before which a pending workflow counts as stalled.
pub(crate) fn stall_cutoff(timeout: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|delta| Utc::now().checked_sub_signed(delta))
        .ok_or(StoreError::InvalidTimeout(timeout))
}
