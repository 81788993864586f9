//! Queue task handlers for forward steps and compensations.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{CompensationStep, Step};
use store::SagaStore;
use task_queue::{HandlerError, StepPayload, Task, TaskHandler, TaskQueue};

use crate::compensation::CompensationHandler;
use crate::engine::SagaEngine;
use crate::error::SagaError;

impl From<SagaError> for HandlerError {
    fn from(err: SagaError) -> Self {
        HandlerError {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

fn decode(task: &Task) -> Result<StepPayload, HandlerError> {
    let payload: StepPayload = task
        .decode()
        .map_err(|e| HandlerError::fatal(format!("malformed task payload: {e}")))?;

    let span = tracing::Span::current();
    span.record("order_id", tracing::field::display(&payload.order_id));
    span.record("step", payload.step.as_str());
    Ok(payload)
}

/// Feeds `step` tasks to the saga engine.
pub struct StepTaskHandler<S, Q> {
    engine: Arc<SagaEngine<S, Q>>,
}

impl<S, Q> StepTaskHandler<S, Q> {
    pub fn new(engine: Arc<SagaEngine<S, Q>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<S, Q> TaskHandler for StepTaskHandler<S, Q>
where
    S: SagaStore + Clone + 'static,
    Q: TaskQueue + Clone + 'static,
{
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        let payload = decode(task)?;
        let step: Step = payload
            .step
            .parse()
            .map_err(|_| HandlerError::from(SagaError::UnknownStep(payload.step.clone())))?;

        let outcome = self.engine.execute_step(&payload.order_id, step).await?;
        tracing::debug!(?outcome, "step task handled");
        Ok(())
    }
}

/// Feeds `compensation` tasks to the compensation handler.
pub struct CompensationTaskHandler {
    compensations: CompensationHandler,
}

impl CompensationTaskHandler {
    pub fn new(compensations: CompensationHandler) -> Self {
        Self { compensations }
    }
}

#[async_trait]
impl TaskHandler for CompensationTaskHandler {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        let payload = decode(task)?;
        let step: CompensationStep = payload
            .step
            .parse()
            .map_err(|_| HandlerError::from(SagaError::UnknownStep(payload.step.clone())))?;

        self.compensations
            .execute_compensation(&payload.order_id, step)
            .await?;
        Ok(())
    }
}
