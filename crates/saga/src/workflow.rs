//! Order and workflow lifecycle operations.

use common::OrderId;
use domain::{Order, Step, WorkflowState};
use store::SagaStore;
use task_queue::{StepPayload, Task, TaskQueue};

use crate::error::{Result, SagaError};

/// Starts sagas and applies the terminal transitions of an order's workflow.
#[derive(Clone)]
pub struct WorkflowManager<S, Q> {
    store: S,
    queue: Q,
}

impl<S, Q> WorkflowManager<S, Q>
where
    S: SagaStore,
    Q: TaskQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Creates the order and its workflow and enqueues the first step.
    ///
    /// Generates an order ID when none is given.
    #[tracing::instrument(skip(self))]
    pub async fn start_saga(&self, order_id: Option<OrderId>) -> Result<OrderId> {
        let order_id = order_id.unwrap_or_else(OrderId::generate);

        let order = Order::new(order_id.clone());
        if !self.store.create_order(&order).await? {
            return Err(SagaError::AlreadyStarted(order_id));
        }

        let workflow = WorkflowState::start(order_id.clone());
        self.store.save_workflow_state(&workflow).await?;

        let first = Step::first();
        self.queue
            .enqueue(Task::step(&StepPayload::new(order_id.clone(), first.as_str()))?)
            .await?;

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(%order_id, step = %first, "saga started");
        Ok(order_id)
    }

    /// Marks the order fulfilled and its workflow completed.
    #[tracing::instrument(skip(self))]
    pub async fn finalize(&self, order_id: &OrderId) -> Result<()> {
        let (mut order, mut workflow) = self.load(order_id).await?;

        if order.fulfill()? {
            self.store.save_order(&order).await?;
        }
        if workflow.complete()? {
            self.store.save_workflow_state(&workflow).await?;
            metrics::counter!("saga_completed_total").increment(1);
            tracing::info!(%order_id, "saga completed");
        }
        Ok(())
    }

    /// Marks the order failed and its workflow compensated.
    ///
    /// Returns false if the workflow was already compensated, in which case
    /// nothing is written.
    #[tracing::instrument(skip(self))]
    pub async fn fail(&self, order_id: &OrderId) -> Result<bool> {
        let (mut order, mut workflow) = self.load(order_id).await?;

        if !workflow.compensate()? {
            return Ok(false);
        }

        if order.fail()? {
            self.store.save_order(&order).await?;
        }
        self.store.save_workflow_state(&workflow).await?;

        metrics::counter!("saga_compensated_total").increment(1);
        Ok(true)
    }

    async fn load(&self, order_id: &OrderId) -> Result<(Order, WorkflowState)> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))?;
        let workflow = self
            .store
            .get_workflow_state(order_id)
            .await?
            .ok_or_else(|| SagaError::WorkflowNotFound(order_id.clone()))?;
        Ok((order, workflow))
    }
}
