//! Stalled workflow detection and re-enqueue.

use std::time::Duration;

use domain::WorkflowState;
use store::SagaStore;
use task_queue::{StepPayload, Task, TaskQueue};

use crate::error::Result;

/// Default age after which a pending workflow counts as stalled.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Finds pending workflows that stopped making progress and re-enqueues
/// their current step.
#[derive(Clone)]
pub struct StallRecovery<S, Q> {
    store: S,
    queue: Q,
}

impl<S, Q> StallRecovery<S, Q>
where
    S: SagaStore,
    Q: TaskQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Returns pending workflows not updated within `timeout`, oldest first.
    pub async fn find_stalled(&self, timeout: Duration) -> Result<Vec<WorkflowState>> {
        let stalled = self.store.get_stalled_workflows(timeout).await?;
        tracing::info!(count = stalled.len(), ?timeout, "stalled workflows found");
        Ok(stalled)
    }

    /// Re-enqueues the current step of every workflow in `stalled`.
    ///
    /// Returns how many tasks were enqueued.
    pub async fn recover(&self, stalled: &[WorkflowState]) -> Result<usize> {
        for workflow in stalled {
            let payload =
                StepPayload::new(workflow.order_id.clone(), workflow.current_step.as_str());
            self.queue.enqueue(Task::step(&payload)?).await?;

            metrics::counter!("workflow_stalled_requeued_total").increment(1);
            tracing::info!(
                order_id = %workflow.order_id,
                step = %workflow.current_step,
                "stalled workflow re-enqueued"
            );
        }
        Ok(stalled.len())
    }

    /// Finds and recovers stalled workflows in one pass.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, timeout: Duration) -> Result<usize> {
        let stalled = self.find_stalled(timeout).await?;
        self.recover(&stalled).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::OrderId;
    use domain::Step;
    use store::{InMemoryStore, WorkflowRepository};
    use task_queue::InMemoryTaskQueue;

    fn minutes_ago(minutes: i64) -> chrono::DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(minutes)
    }

    async fn save_updated_ago(store: &InMemoryStore, id: &str, minutes: i64) -> WorkflowState {
        let mut workflow = WorkflowState::start(OrderId::new(id));
        workflow.updated_at = minutes_ago(minutes);
        store.save_workflow_state(&workflow).await.unwrap();
        workflow
    }

    #[tokio::test]
    async fn test_stall_detection_boundary() {
        let store = InMemoryStore::new();
        let recovery = StallRecovery::new(store.clone(), InMemoryTaskQueue::new());
        save_updated_ago(&store, "six", 6).await;
        save_updated_ago(&store, "four", 4).await;

        let stalled = recovery.find_stalled(DEFAULT_STALL_TIMEOUT).await.unwrap();

        let ids: Vec<&str> = stalled.iter().map(|wf| wf.order_id.as_str()).collect();
        assert_eq!(ids, vec!["six"]);
    }

    #[tokio::test]
    async fn test_recover_enqueues_current_step() {
        let store = InMemoryStore::new();
        let queue = InMemoryTaskQueue::new();
        let recovery = StallRecovery::new(store.clone(), queue.clone());

        let mut workflow = WorkflowState::start(OrderId::new("A"));
        workflow.advance(Step::ReserveSlot).unwrap();
        workflow.updated_at = minutes_ago(10);
        store.save_workflow_state(&workflow).await.unwrap();

        let count = recovery.run(DEFAULT_STALL_TIMEOUT).await.unwrap();

        assert_eq!(count, 1);
        let tasks = queue.enqueued().await;
        let payload: StepPayload = tasks[0].decode().unwrap();
        assert_eq!(payload, StepPayload::new(OrderId::new("A"), "assign_agent"));
    }

    #[tokio::test]
    async fn test_recover_nothing_when_nothing_stalled() {
        let store = InMemoryStore::new();
        let queue = InMemoryTaskQueue::new();
        let recovery = StallRecovery::new(store.clone(), queue.clone());
        save_updated_ago(&store, "fresh", 1).await;

        assert_eq!(recovery.run(DEFAULT_STALL_TIMEOUT).await.unwrap(), 0);
        assert!(queue.enqueued().await.is_empty());
    }
}
