//! Step identifier → operation lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{CompensationStep, Step};

use crate::error::{Result, SagaError};
use crate::services::{AgentService, NotificationService, SlotService};

/// A forward step's side effect.
#[async_trait]
pub trait StepOperation: Send + Sync {
    async fn execute(&self, order_id: &OrderId) -> Result<()>;
}

/// A compensating action undoing a forward step.
#[async_trait]
pub trait CompensationOperation: Send + Sync {
    async fn compensate(&self, order_id: &OrderId) -> Result<()>;
}

struct ReserveSlot(Arc<dyn SlotService>);

#[async_trait]
impl StepOperation for ReserveSlot {
    async fn execute(&self, order_id: &OrderId) -> Result<()> {
        self.0.reserve(order_id).await.map(|_| ())
    }
}

struct ReleaseSlot(Arc<dyn SlotService>);

#[async_trait]
impl CompensationOperation for ReleaseSlot {
    async fn compensate(&self, order_id: &OrderId) -> Result<()> {
        self.0.release(order_id).await
    }
}

struct AssignAgents(Arc<dyn AgentService>);

#[async_trait]
impl StepOperation for AssignAgents {
    async fn execute(&self, order_id: &OrderId) -> Result<()> {
        self.0.assign(order_id).await.map(|_| ())
    }
}

struct UnassignAgents(Arc<dyn AgentService>);

#[async_trait]
impl CompensationOperation for UnassignAgents {
    async fn compensate(&self, order_id: &OrderId) -> Result<()> {
        self.0.unassign(order_id).await
    }
}

struct NotifyCustomer(Arc<dyn NotificationService>);

#[async_trait]
impl StepOperation for NotifyCustomer {
    async fn execute(&self, order_id: &OrderId) -> Result<()> {
        self.0.notify(order_id).await
    }
}

struct CancelNotification(Arc<dyn NotificationService>);

#[async_trait]
impl CompensationOperation for CancelNotification {
    async fn compensate(&self, order_id: &OrderId) -> Result<()> {
        self.0.cancel(order_id).await
    }
}

/// Operations registered per step and compensation identifier.
#[derive(Default, Clone)]
pub struct StepRegistry {
    steps: HashMap<Step, Arc<dyn StepOperation>>,
    compensations: HashMap<CompensationStep, Arc<dyn CompensationOperation>>,
}

impl StepRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry wiring every step and compensation to its service.
    pub fn standard(
        slots: impl SlotService + 'static,
        agents: impl AgentService + 'static,
        notifications: impl NotificationService + 'static,
    ) -> Self {
        let slots: Arc<dyn SlotService> = Arc::new(slots);
        let agents: Arc<dyn AgentService> = Arc::new(agents);
        let notifications: Arc<dyn NotificationService> = Arc::new(notifications);

        Self::new()
            .with_step(Step::ReserveSlot, ReserveSlot(slots.clone()))
            .with_step(Step::AssignAgent, AssignAgents(agents.clone()))
            .with_step(Step::NotifyCustomer, NotifyCustomer(notifications.clone()))
            .with_compensation(CompensationStep::ReleaseSlot, ReleaseSlot(slots))
            .with_compensation(CompensationStep::UnassignAgent, UnassignAgents(agents))
            .with_compensation(
                CompensationStep::CancelNotification,
                CancelNotification(notifications),
            )
    }

    /// Registers the operation for a forward step.
    pub fn with_step(mut self, step: Step, operation: impl StepOperation + 'static) -> Self {
        self.steps.insert(step, Arc::new(operation));
        self
    }

    /// Registers the operation for a compensation.
    pub fn with_compensation(
        mut self,
        step: CompensationStep,
        operation: impl CompensationOperation + 'static,
    ) -> Self {
        self.compensations.insert(step, Arc::new(operation));
        self
    }

    /// Looks up the operation for a forward step.
    pub fn step(&self, step: Step) -> Result<Arc<dyn StepOperation>> {
        self.steps
            .get(&step)
            .cloned()
            .ok_or_else(|| SagaError::UnknownStep(step.to_string()))
    }

    /// Looks up the operation for a compensation.
    pub fn compensation(&self, step: CompensationStep) -> Result<Arc<dyn CompensationOperation>> {
        self.compensations
            .get(&step)
            .cloned()
            .ok_or_else(|| SagaError::UnknownStep(step.to_string()))
    }
}
