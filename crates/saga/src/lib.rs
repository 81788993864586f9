//! Saga orchestration for order fulfillment.
//!
//! Every order runs the same three forward steps:
//! 1. Reserve a pickup slot
//! 2. Assign agents
//! 3. Notify the customer
//!
//! Each step runs as its own queue task. The engine records every outcome in
//! an idempotency ledger before issuing follow-up work, so redelivered tasks
//! never run a step twice. If a step fails, the steps completed before it are
//! compensated in reverse order through compensation tasks.

pub mod compensation;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod recovery;
pub mod registry;
pub mod services;
pub mod workflow;

pub use compensation::{CompensationHandler, CompensationRunner};
pub use config::{ChaosGate, EngineConfig};
pub use engine::{SagaEngine, StepOutcome};
pub use error::{Result, SagaError};
pub use handlers::{CompensationTaskHandler, StepTaskHandler};
pub use recovery::{DEFAULT_STALL_TIMEOUT, StallRecovery};
pub use registry::{CompensationOperation, StepOperation, StepRegistry};
pub use services::{
    AGENTS_PER_ORDER, AgentService, InMemoryNotificationService, InMemorySlotService,
    NotificationService, SlotService, StoreAgentService,
};
pub use workflow::WorkflowManager;
