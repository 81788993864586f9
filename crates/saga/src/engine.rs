//! Step execution: ledger gate, chaos, forward operation, follow-up.

use std::sync::Arc;

use common::OrderId;
use domain::{Advance, DedupeKey, DomainError, Step, StepResult, WorkflowState, WorkflowStatus};
use store::{RecordOutcome, SagaStore};
use task_queue::{StepPayload, Task, TaskQueue};

use crate::compensation::CompensationRunner;
use crate::config::{ChaosGate, EngineConfig};
use crate::error::{Result, SagaError};
use crate::registry::StepRegistry;
use crate::workflow::WorkflowManager;

/// What an `execute_step` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step succeeded and the next step was enqueued.
    Advanced(Step),
    /// The last step succeeded and the saga was finalized.
    Completed,
    /// A success was already recorded and its follow-up already issued.
    AlreadyApplied,
    /// Another attempt recorded its outcome first; this one did nothing more.
    Duplicate(StepResult),
    /// The workflow had reached a terminal state; nothing was run.
    Skipped,
}

/// Runs one attempt of one forward step for one order.
///
/// The ledger's insert-if-absent write is the only guard against running a
/// step's follow-up twice, so it happens before any enqueue.
pub struct SagaEngine<S, Q> {
    store: S,
    queue: Q,
    registry: Arc<StepRegistry>,
    chaos: ChaosGate,
    workflows: WorkflowManager<S, Q>,
    compensation: CompensationRunner<S, Q>,
}

impl<S, Q> SagaEngine<S, Q>
where
    S: SagaStore + Clone,
    Q: TaskQueue + Clone,
{
    pub fn new(store: S, queue: Q, registry: Arc<StepRegistry>, config: EngineConfig) -> Self {
        Self {
            workflows: WorkflowManager::new(store.clone(), queue.clone()),
            compensation: CompensationRunner::new(store.clone(), queue.clone()),
            chaos: ChaosGate::new(&config),
            store,
            queue,
            registry,
        }
    }

    /// Executes `step` for `order_id`.
    ///
    /// A failed step triggers the compensation cascade and is reported as
    /// [`SagaError::StepFailed`].
    #[tracing::instrument(skip_all, fields(order_id = %order_id, step = %step))]
    pub async fn execute_step(&self, order_id: &OrderId, step: Step) -> Result<StepOutcome> {
        let key = DedupeKey::new(order_id, step);

        match self.store.is_executed(&key).await? {
            Some(StepResult::Success) => return self.replay_success(order_id, step).await,
            Some(StepResult::Failed) => {
                tracing::warn!("step previously failed, not re-running");
                self.resume_cascade(order_id, step).await?;
                return Err(SagaError::StepPreviouslyFailed {
                    order_id: order_id.clone(),
                    step,
                });
            }
            None => {}
        }

        let workflow = self.load_workflow(order_id).await?;
        if workflow.is_terminal() {
            tracing::info!(status = %workflow.status, "workflow already terminal, skipping step");
            return Ok(StepOutcome::Skipped);
        }
        if workflow.current_step != step {
            return Err(DomainError::StepOutOfOrder {
                current: workflow.current_step,
                completed: step,
            }
            .into());
        }

        let operation = self.registry.step(step)?;
        let chaos = self.chaos.fires();
        let attempt = match operation.execute(order_id).await {
            Err(e) => Err(e.to_string()),
            Ok(()) if chaos => Err("chaos injected".to_string()),
            Ok(()) => Ok(()),
        };
        let result = if attempt.is_ok() {
            StepResult::Success
        } else {
            StepResult::Failed
        };

        if let RecordOutcome::AlreadyRecorded(existing) =
            self.store.save_execution(&key, result).await?
        {
            tracing::info!(%existing, "outcome already recorded by a concurrent attempt");
            return Ok(StepOutcome::Duplicate(existing));
        }

        match attempt {
            Ok(()) => {
                metrics::counter!("workflow_step_success_total", "step" => step.as_str())
                    .increment(1);
                tracing::info!(outcome = "success", "step executed");
                self.advance(workflow, step).await
            }
            Err(reason) => {
                metrics::counter!("workflow_step_failure_total", "step" => step.as_str())
                    .increment(1);
                tracing::warn!(outcome = "failed", %reason, "step failed, compensating");
                self.compensation.compensate(order_id, step).await?;
                Err(SagaError::StepFailed {
                    order_id: order_id.clone(),
                    step,
                    reason,
                })
            }
        }
    }

    /// Handles a redelivered step whose success is already in the ledger.
    ///
    /// The follow-up is issued only if the workflow still sits at `step`,
    /// meaning the earlier attempt stopped between the ledger write and the
    /// advance.
    async fn replay_success(&self, order_id: &OrderId, step: Step) -> Result<StepOutcome> {
        let workflow = self.load_workflow(order_id).await?;

        if workflow.status == WorkflowStatus::Pending && workflow.current_step == step {
            tracing::info!("success recorded but not applied, resuming follow-up");
            return self.advance(workflow, step).await;
        }

        tracing::debug!(
            status = %workflow.status,
            current_step = %workflow.current_step,
            "step already applied"
        );
        Ok(StepOutcome::AlreadyApplied)
    }

    /// Starts the compensation cascade for a failure already in the ledger
    /// if an earlier attempt stopped before the workflow left `Pending`.
    async fn resume_cascade(&self, order_id: &OrderId, step: Step) -> Result<()> {
        let workflow = self.load_workflow(order_id).await?;
        if workflow.status == WorkflowStatus::Pending {
            tracing::info!("failure recorded but not compensated, resuming cascade");
            self.compensation.compensate(order_id, step).await?;
        }
        Ok(())
    }

    async fn advance(&self, mut workflow: WorkflowState, completed: Step) -> Result<StepOutcome> {
        match workflow.advance(completed)? {
            Advance::Next(next) => {
                self.store.save_workflow_state(&workflow).await?;
                let payload = StepPayload::new(workflow.order_id.clone(), next.as_str());
                self.queue.enqueue(Task::step(&payload)?).await?;
                tracing::info!(next = %next, "next step enqueued");
                Ok(StepOutcome::Advanced(next))
            }
            Advance::Done => {
                self.workflows.finalize(&workflow.order_id).await?;
                Ok(StepOutcome::Completed)
            }
        }
    }

    async fn load_workflow(&self, order_id: &OrderId) -> Result<WorkflowState> {
        self.store
            .get_workflow_state(order_id)
            .await?
            .ok_or_else(|| SagaError::WorkflowNotFound(order_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryNotificationService, InMemorySlotService, StoreAgentService};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use domain::Order;
    use store::{
        AgentRepository, ExecutionLedger, InMemoryStore, OrderRepository, StoreError,
        WorkflowRepository,
    };
    use task_queue::InMemoryTaskQueue;

    /// In-memory store whose next order write can be made to fail once.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        fail_order_save: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn fail_next_order_save(&self) {
            self.fail_order_save.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl OrderRepository for FlakyStore {
        async fn create_order(&self, order: &Order) -> store::Result<bool> {
            self.inner.create_order(order).await
        }

        async fn save_order(&self, order: &Order) -> store::Result<()> {
            if self.fail_order_save.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.save_order(order).await
        }

        async fn get_order(&self, order_id: &OrderId) -> store::Result<Option<Order>> {
            self.inner.get_order(order_id).await
        }
    }

    #[async_trait]
    impl WorkflowRepository for FlakyStore {
        async fn save_workflow_state(&self, state: &WorkflowState) -> store::Result<()> {
            self.inner.save_workflow_state(state).await
        }

        async fn get_workflow_state(
            &self,
            order_id: &OrderId,
        ) -> store::Result<Option<WorkflowState>> {
            self.inner.get_workflow_state(order_id).await
        }

        async fn get_stalled_workflows(
            &self,
            timeout: Duration,
        ) -> store::Result<Vec<WorkflowState>> {
            self.inner.get_stalled_workflows(timeout).await
        }
    }

    #[async_trait]
    impl ExecutionLedger for FlakyStore {
        async fn is_executed(&self, key: &DedupeKey) -> store::Result<Option<StepResult>> {
            self.inner.is_executed(key).await
        }

        async fn save_execution(
            &self,
            key: &DedupeKey,
            result: StepResult,
        ) -> store::Result<RecordOutcome> {
            self.inner.save_execution(key, result).await
        }
    }

    #[async_trait]
    impl AgentRepository for FlakyStore {
        async fn assign_agent(&self, order_id: &OrderId, agent_id: &str) -> store::Result<()> {
            self.inner.assign_agent(order_id, agent_id).await
        }

        async fn get_agents_by_order_id(&self, order_id: &OrderId) -> store::Result<Vec<String>> {
            self.inner.get_agents_by_order_id(order_id).await
        }

        async fn unassign_agents(&self, order_id: &OrderId) -> store::Result<()> {
            self.inner.unassign_agents(order_id).await
        }
    }

    struct Fixture<S = InMemoryStore> {
        engine: SagaEngine<S, InMemoryTaskQueue>,
        store: S,
        queue: InMemoryTaskQueue,
        slots: InMemorySlotService,
        notifications: InMemoryNotificationService,
    }

    async fn fixture(chaos_probability: f64) -> (Fixture, OrderId) {
        fixture_with(InMemoryStore::new(), chaos_probability).await
    }

    async fn fixture_with<S: SagaStore + Clone + 'static>(
        store: S,
        chaos_probability: f64,
    ) -> (Fixture<S>, OrderId) {
        let queue = InMemoryTaskQueue::new();
        let slots = InMemorySlotService::new();
        let notifications = InMemoryNotificationService::new();
        let registry = StepRegistry::standard(
            slots.clone(),
            StoreAgentService::new(store.clone()),
            notifications.clone(),
        );
        let engine = SagaEngine::new(
            store.clone(),
            queue.clone(),
            Arc::new(registry),
            EngineConfig::new(chaos_probability).unwrap(),
        );
        let order_id = WorkflowManager::new(store.clone(), queue.clone())
            .start_saga(Some(OrderId::new("A")))
            .await
            .unwrap();
        (
            Fixture {
                engine,
                store,
                queue,
                slots,
                notifications,
            },
            order_id,
        )
    }

    #[tokio::test]
    async fn test_step_advances_workflow() {
        let (f, order_id) = fixture(0.0).await;

        let outcome = f
            .engine
            .execute_step(&order_id, Step::ReserveSlot)
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Advanced(Step::AssignAgent));
        let workflow = f.store.get_workflow_state(&order_id).await.unwrap().unwrap();
        assert_eq!(workflow.current_step, Step::AssignAgent);
        assert_eq!(
            f.store
                .is_executed(&DedupeKey::new(&order_id, Step::ReserveSlot))
                .await
                .unwrap(),
            Some(StepResult::Success)
        );
        // Start task plus the follow-up.
        assert_eq!(f.queue.enqueued().await.len(), 2);
    }

    #[tokio::test]
    async fn test_replayed_success_does_not_rerun() {
        let (f, order_id) = fixture(0.0).await;

        f.engine
            .execute_step(&order_id, Step::ReserveSlot)
            .await
            .unwrap();
        let replay = f
            .engine
            .execute_step(&order_id, Step::ReserveSlot)
            .await
            .unwrap();

        assert_eq!(replay, StepOutcome::AlreadyApplied);
        assert_eq!(f.queue.enqueued().await.len(), 2);
        assert_eq!(f.store.execution_count().await, 1);
    }

    #[tokio::test]
    async fn test_replayed_success_resumes_missing_follow_up() {
        let (f, order_id) = fixture(0.0).await;
        f.store
            .save_execution(
                &DedupeKey::new(&order_id, Step::ReserveSlot),
                StepResult::Success,
            )
            .await
            .unwrap();

        let outcome = f
            .engine
            .execute_step(&order_id, Step::ReserveSlot)
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Advanced(Step::AssignAgent));
    }

    #[tokio::test]
    async fn test_previously_failed_step_is_terminal() {
        let (f, order_id) = fixture(0.0).await;
        f.store
            .save_execution(
                &DedupeKey::new(&order_id, Step::ReserveSlot),
                StepResult::Failed,
            )
            .await
            .unwrap();

        let result = f.engine.execute_step(&order_id, Step::ReserveSlot).await;

        assert!(matches!(result, Err(SagaError::StepPreviouslyFailed { .. })));
        assert_eq!(f.queue.enqueued().await.len(), 1);
        let workflow = f.store.get_workflow_state(&order_id).await.unwrap().unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Compensated);
    }

    #[tokio::test]
    async fn test_chaos_failure_compensates() {
        let (f, order_id) = fixture(1.0).await;

        let result = f.engine.execute_step(&order_id, Step::ReserveSlot).await;

        assert!(matches!(
            result,
            Err(SagaError::StepFailed { ref reason, .. }) if reason == "chaos injected"
        ));
        let workflow = f.store.get_workflow_state(&order_id).await.unwrap().unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Compensated);
        assert_eq!(f.notifications.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_chaos_still_runs_forward_operation() {
        let (f, order_id) = fixture(1.0).await;

        let result = f.engine.execute_step(&order_id, Step::ReserveSlot).await;

        assert!(matches!(result, Err(SagaError::StepFailed { .. })));
        assert_eq!(f.slots.reserved_count().await, 1);
        assert_eq!(
            f.store
                .is_executed(&DedupeKey::new(&order_id, Step::ReserveSlot))
                .await
                .unwrap(),
            Some(StepResult::Failed)
        );
    }

    #[tokio::test]
    async fn test_operation_failure_wins_over_quiet_chaos() {
        let (f, order_id) = fixture(0.0).await;
        f.slots.set_fail_on_reserve(true).await;

        let result = f.engine.execute_step(&order_id, Step::ReserveSlot).await;

        assert!(matches!(
            result,
            Err(SagaError::StepFailed { ref reason, .. }) if reason != "chaos injected"
        ));
    }

    #[tokio::test]
    async fn test_retry_after_interrupted_cascade_compensates() {
        let store = FlakyStore::default();
        let (f, order_id) = fixture_with(store.clone(), 0.0).await;
        f.engine
            .execute_step(&order_id, Step::ReserveSlot)
            .await
            .unwrap();
        f.engine
            .execute_step(&order_id, Step::AssignAgent)
            .await
            .unwrap();
        f.notifications.set_fail_on_notify(true).await;
        store.fail_next_order_save();

        let first = f.engine.execute_step(&order_id, Step::NotifyCustomer).await;
        assert!(first.as_ref().is_err_and(SagaError::is_retryable));
        let workflow = store.get_workflow_state(&order_id).await.unwrap().unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Pending);

        let retry = f.engine.execute_step(&order_id, Step::NotifyCustomer).await;

        assert!(matches!(retry, Err(SagaError::StepPreviouslyFailed { .. })));
        let workflow = store.get_workflow_state(&order_id).await.unwrap().unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Compensated);
        let order = store.get_order(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, domain::OrderStatus::Failed);
        let compensations: Vec<String> = f
            .queue
            .enqueued()
            .await
            .iter()
            .filter(|t| t.task_type == task_queue::TaskType::Compensation)
            .map(|t| t.decode::<StepPayload>().unwrap().step)
            .collect();
        assert_eq!(compensations, ["unassign_agent", "release_pickup_slot"]);

        // A further redelivery finds the cascade done and enqueues nothing.
        let before = f.queue.enqueued().await.len();
        let again = f.engine.execute_step(&order_id, Step::NotifyCustomer).await;
        assert!(matches!(again, Err(SagaError::StepPreviouslyFailed { .. })));
        assert_eq!(f.queue.enqueued().await.len(), before);
    }

    #[tokio::test]
    async fn test_out_of_order_step_is_rejected_before_running() {
        let (f, order_id) = fixture(0.0).await;

        let result = f.engine.execute_step(&order_id, Step::NotifyCustomer).await;

        assert!(matches!(result, Err(SagaError::Domain(_))));
        assert_eq!(f.notifications.sent_count().await, 0);
        assert_eq!(f.store.execution_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_workflow_is_consistency_error() {
        let (f, _) = fixture(0.0).await;

        let result = f
            .engine
            .execute_step(&OrderId::new("ghost"), Step::ReserveSlot)
            .await;

        assert!(matches!(result, Err(SagaError::WorkflowNotFound(_))));
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_retryable() {
        let (f, order_id) = fixture(0.0).await;
        f.queue.set_fail_on_enqueue(true);

        let err = f
            .engine
            .execute_step(&order_id, Step::ReserveSlot)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }
}
