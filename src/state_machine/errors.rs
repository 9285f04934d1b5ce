use crate::error::ApprovalError;
use thiserror::Error;

/// Error types for state machine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Guard condition failed: {0}")]
    GuardFailed(#[from] GuardError),

    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a decision is refused before any state changes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Step is {state}, not active")]
    StepNotActive { state: String },

    #[error("Instance is already {state}")]
    InstanceTerminal { state: String },

    #[error("{approver_id} is not a resolved approver of the step")]
    NotResolvedApprover { approver_id: String },

    #[error("{approver_id} decided before {expected_approver_id}")]
    OutOfOrder {
        approver_id: String,
        expected_approver_id: String,
    },

    #[error("{approver_id} already recorded {previous}")]
    AlreadyDecided {
        approver_id: String,
        previous: String,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;

impl From<StateMachineError> for ApprovalError {
    fn from(err: StateMachineError) -> Self {
        ApprovalError::StateMachine(format!("{err}"))
    }
}
