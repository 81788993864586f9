//! Saga step identifiers and the tables that drive them.
//!
//! The forward sequence and the compensation mapping are plain lookup tables
//! keyed by [`Step`]; adding a step means adding a row, not a branch.

use std::str::FromStr;

use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A forward step of the fulfillment saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    /// Reserve a pickup slot for the order.
    #[serde(rename = "reserve_pickup_slot")]
    ReserveSlot,

    /// Assign delivery agents to the order.
    #[serde(rename = "assign_agent")]
    AssignAgent,

    /// Tell the customer the order is ready for pickup.
    #[serde(rename = "notify_customer")]
    NotifyCustomer,
}

/// The fixed forward step sequence, in execution order.
pub const FORWARD_SEQUENCE: [Step; 3] = [Step::ReserveSlot, Step::AssignAgent, Step::NotifyCustomer];

/// Failed step → compensations to run, in order.
///
/// Only steps that completed before the failure are undone, newest first.
const COMPENSATION_TABLE: [(Step, &[CompensationStep]); 3] = [
    (Step::ReserveSlot, &[]),
    (Step::AssignAgent, &[CompensationStep::ReleaseSlot]),
    (
        Step::NotifyCustomer,
        &[CompensationStep::UnassignAgent, CompensationStep::ReleaseSlot],
    ),
];

/// What follows a successfully completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Run this step next.
    Next(Step),
    /// The sequence is exhausted; the saga is finalized.
    Done,
}

impl Step {
    /// Returns the step every saga starts with.
    pub fn first() -> Self {
        FORWARD_SEQUENCE[0]
    }

    /// Returns the step following `self` in the forward sequence.
    pub fn next(self) -> Advance {
        let position = FORWARD_SEQUENCE
            .iter()
            .position(|step| *step == self)
            .unwrap_or(FORWARD_SEQUENCE.len() - 1);

        match FORWARD_SEQUENCE.get(position + 1) {
            Some(step) => Advance::Next(*step),
            None => Advance::Done,
        }
    }

    /// Returns the wire identifier of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ReserveSlot => "reserve_pickup_slot",
            Step::AssignAgent => "assign_agent",
            Step::NotifyCustomer => "notify_customer",
        }
    }
}

impl FromStr for Step {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FORWARD_SEQUENCE
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStep(s.to_string()))
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compensating action that undoes a forward step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompensationStep {
    /// Undoes [`Step::ReserveSlot`].
    #[serde(rename = "release_pickup_slot")]
    ReleaseSlot,

    /// Undoes [`Step::AssignAgent`].
    #[serde(rename = "unassign_agent")]
    UnassignAgent,

    /// Undoes [`Step::NotifyCustomer`].
    #[serde(rename = "cancel_notification")]
    CancelNotification,
}

impl CompensationStep {
    /// All known compensations.
    pub const ALL: [CompensationStep; 3] = [
        CompensationStep::ReleaseSlot,
        CompensationStep::UnassignAgent,
        CompensationStep::CancelNotification,
    ];

    /// Returns the wire identifier of the compensation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationStep::ReleaseSlot => "release_pickup_slot",
            CompensationStep::UnassignAgent => "unassign_agent",
            CompensationStep::CancelNotification => "cancel_notification",
        }
    }
}

impl FromStr for CompensationStep {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|comp| comp.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCompensation(s.to_string()))
    }
}

impl std::fmt::Display for CompensationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns the compensations to run when `failed` fails, in order.
pub fn compensations_for(failed: Step) -> &'static [CompensationStep] {
    COMPENSATION_TABLE
        .iter()
        .find(|(step, _)| *step == failed)
        .map(|(_, comps)| *comps)
        .unwrap_or(&[])
}

/// Ledger key identifying one step attempt of one order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupeKey(String);

impl DedupeKey {
    /// Builds the key for a forward step of an order.
    pub fn new(order_id: &OrderId, step: Step) -> Self {
        Self(format!("{}_{}", order_id, step.as_str()))
    }

    /// Wraps a key read back from storage.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Definitive outcome of a step attempt, as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Success,
    Failed,
}

impl StepResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepResult::Success => "success",
            StepResult::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success)
    }
}

impl FromStr for StepResult {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(StepResult::Success),
            "failed" => Ok(StepResult::Failed),
            other => Err(DomainError::UnknownResult(other.to_string())),
        }
    }
}

impl std::fmt::Display for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
