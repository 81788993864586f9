//! Compensation cascade and compensating-action execution.

use std::sync::Arc;

use common::OrderId;
use domain::{CompensationStep, Step, compensations_for};
use store::SagaStore;
use task_queue::{StepPayload, Task, TaskQueue};

use crate::error::{Result, SagaError};
use crate::registry::StepRegistry;
use crate::workflow::WorkflowManager;

/// Reacts to a failed forward step: marks the saga failed and enqueues the
/// compensations for the steps that completed before it.
#[derive(Clone)]
pub struct CompensationRunner<S, Q> {
    workflows: WorkflowManager<S, Q>,
    queue: Q,
}

impl<S, Q> CompensationRunner<S, Q>
where
    S: SagaStore,
    Q: TaskQueue + Clone,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self {
            workflows: WorkflowManager::new(store, queue.clone()),
            queue,
        }
    }

    /// Runs the cascade for `failed_step` and returns the compensations
    /// enqueued, in order.
    ///
    /// A workflow that is already compensated is left alone and nothing is
    /// enqueued.
    #[tracing::instrument(skip(self))]
    pub async fn compensate(
        &self,
        order_id: &OrderId,
        failed_step: Step,
    ) -> Result<Vec<CompensationStep>> {
        if !self.workflows.fail(order_id).await? {
            tracing::info!(%order_id, step = %failed_step, "cascade already initiated");
            return Ok(Vec::new());
        }

        let compensations = compensations_for(failed_step);
        if compensations.is_empty() {
            tracing::info!(%order_id, step = %failed_step, "no compensation needed");
            return Ok(Vec::new());
        }

        for compensation in compensations {
            let payload = StepPayload::new(order_id.clone(), compensation.as_str());
            self.queue.enqueue(Task::compensation(&payload)?).await?;
            tracing::info!(%order_id, compensation = %compensation, "compensation enqueued");
        }

        Ok(compensations.to_vec())
    }
}

/// Runs a single compensating action.
///
/// Compensations bypass the ledger. A failing compensation is counted and
/// reported but never re-enters the cascade.
#[derive(Clone)]
pub struct CompensationHandler {
    registry: Arc<StepRegistry>,
}

impl CompensationHandler {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self { registry }
    }

    #[tracing::instrument(skip(self))]
    pub async fn execute_compensation(
        &self,
        order_id: &OrderId,
        step: CompensationStep,
    ) -> Result<()> {
        let operation = self.registry.compensation(step)?;

        metrics::counter!("workflow_compensation_total", "compensation_step" => step.as_str())
            .increment(1);

        match operation.compensate(order_id).await {
            Ok(()) => {
                tracing::info!(%order_id, compensation = %step, "compensation executed");
                Ok(())
            }
            Err(e) => {
                metrics::counter!(
                    "workflow_compensation_failure_total",
                    "compensation_step" => step.as_str()
                )
                .increment(1);
                tracing::warn!(%order_id, compensation = %step, error = %e, "compensation failed");
                Err(SagaError::CompensationFailed {
                    order_id: order_id.clone(),
                    step,
                    reason: e.to_string(),
                })
            }
        }
    }
}
