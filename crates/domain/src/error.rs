//! Domain error types.

use thiserror::Error;

use crate::step::Step;

/// Errors raised by the saga domain model.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A step identifier that is not part of the forward sequence.
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// A compensation identifier with no known compensating action.
    #[error("Unknown compensation step: {0}")]
    UnknownCompensation(String),

    /// A stored status value that no state machine recognizes.
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// A stored ledger result other than success or failed.
    #[error("Unknown step result: {0}")]
    UnknownResult(String),

    /// The requested transition is not allowed from the current state.
    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidTransition {
        current: &'static str,
        action: &'static str,
    },

    /// A completed step does not match the workflow's current step.
    #[error("Step {completed} completed but workflow is at {current}")]
    StepOutOfOrder { current: Step, completed: Step },
}
