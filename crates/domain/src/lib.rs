//! Domain model for the saga workflow orchestrator.
//!
//! This crate provides:
//! - Order and its status lifecycle
//! - WorkflowState, the per-order step state machine
//! - Step and CompensationStep identifiers with the forward sequence and
//!   compensation tables
//! - Ledger key and result types

pub mod error;
pub mod order;
pub mod step;
pub mod workflow;

pub use common::OrderId;
pub use error::DomainError;
pub use order::{Order, OrderStatus};
pub use step::{
    Advance, CompensationStep, DedupeKey, FORWARD_SEQUENCE, Step, StepResult, compensations_for,
};
pub use workflow::{WorkflowState, WorkflowStatus};
