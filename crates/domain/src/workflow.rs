//! Workflow state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::step::{Advance, Step};

/// The status of a saga workflow.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed
///           └──► Failed ──► Compensated
/// ```
///
/// `Failed` is transient: the cascade moves it to `Compensated` as soon as
/// the compensations have been enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Forward steps are still running.
    #[default]
    Pending,

    /// Every forward step succeeded (terminal state).
    Completed,

    /// A forward step failed; the cascade has not been recorded yet.
    Failed,

    /// The compensation cascade was initiated (terminal state).
    Compensated,
}

impl WorkflowStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Compensated)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Compensated => "compensated",
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "compensated" => Ok(WorkflowStatus::Compensated),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-order progression through the forward step sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub order_id: OrderId,
    pub current_step: Step,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Seeds a workflow at the first forward step.
    pub fn start(order_id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            current_step: Step::first(),
            status: WorkflowStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true once the workflow can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves past `completed`, which must be the current step.
    ///
    /// On [`Advance::Next`] the current step is updated; on [`Advance::Done`]
    /// the state is left for [`WorkflowState::complete`] to finalize.
    pub fn advance(&mut self, completed: Step) -> Result<Advance, DomainError> {
        if self.status != WorkflowStatus::Pending {
            return Err(DomainError::InvalidTransition {
                current: self.status.as_str(),
                action: "advance",
            });
        }
        if self.current_step != completed {
            return Err(DomainError::StepOutOfOrder {
                current: self.current_step,
                completed,
            });
        }

        let advance = completed.next();
        if let Advance::Next(next) = advance {
            self.current_step = next;
            self.updated_at = Utc::now();
        }
        Ok(advance)
    }

    /// Marks the workflow completed.
    ///
    /// Returns `Ok(false)` if it already was.
    pub fn complete(&mut self) -> Result<bool, DomainError> {
        match self.status {
            WorkflowStatus::Completed => Ok(false),
            WorkflowStatus::Pending => {
                self.status = WorkflowStatus::Completed;
                self.updated_at = Utc::now();
                Ok(true)
            }
            other => Err(DomainError::InvalidTransition {
                current: other.as_str(),
                action: "complete",
            }),
        }
    }

    /// Marks the compensation cascade as initiated.
    ///
    /// Returns `Ok(false)` if it already was.
    pub fn compensate(&mut self) -> Result<bool, DomainError> {
        match self.status {
            WorkflowStatus::Compensated => Ok(false),
            WorkflowStatus::Pending | WorkflowStatus::Failed => {
                self.status = WorkflowStatus::Compensated;
                self.updated_at = Utc::now();
                Ok(true)
            }
            WorkflowStatus::Completed => Err(DomainError::InvalidTransition {
                current: WorkflowStatus::Completed.as_str(),
                action: "compensate",
            }),
        }
    }
}
