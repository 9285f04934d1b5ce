//! # Error Types
//!
//! Every fallible public operation of the engine returns [`ApprovalError`].
//! Variants are grouped by [`ErrorCategory`] so callers can decide whether to
//! surface a configuration problem, refuse a caller, or refresh and retry.
//!
//! Escalation outcomes (a timed out step being skipped or rejecting its
//! instance) are business results recorded on the instance, never errors.

use crate::models::DocumentType;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("No applicable approval flow for {document_type} in tenant {tenant_id}")]
    NoApplicableFlow {
        tenant_id: String,
        document_type: DocumentType,
    },

    #[error("Step {step_number} of flow {flow_id} resolved {resolved} approver(s) but requires {required}")]
    UnsatisfiableStep {
        flow_id: Uuid,
        step_number: u32,
        resolved: usize,
        required: u32,
    },

    #[error("User {approver_id} is not an approver of the active step of instance {instance_id}")]
    UnauthorizedApprover {
        instance_id: Uuid,
        approver_id: String,
    },

    #[error("User {approver_id} decided out of order on instance {instance_id}; waiting on {expected_approver_id}")]
    OutOfOrderDecision {
        instance_id: Uuid,
        approver_id: String,
        expected_approver_id: String,
    },

    #[error("Instance {instance_id} changed underneath the caller: {reason}")]
    StaleState { instance_id: Uuid, reason: String },

    #[error("Flow instance {0} not found")]
    InstanceNotFound(Uuid),

    #[error("Flow definition {0} not found")]
    FlowDefinitionNotFound(Uuid),

    #[error("Flow definition {0} is the default flow and cannot be deleted")]
    DefaultFlowDeletion(Uuid),

    #[error("Invalid flow definition: {0}")]
    InvalidDefinition(String),

    #[error("Delegation for {user_id} overlaps existing record {existing_id}")]
    DelegationConflict { user_id: String, existing_id: Uuid },

    #[error("Invalid delegation: {0}")]
    InvalidDelegation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("State machine error: {0}")]
    StateMachine(String),
}

/// Coarse classification of [`ApprovalError`] used for logging and by callers
/// deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Routing cannot be established; surfaced to the submitter
    Configuration,
    /// Caller is not allowed to act; state unchanged
    Authorization,
    /// Race or UI desync; refresh and retry
    Ordering,
    /// Programmer misuse, such as an unknown id
    NotFound,
    /// Collaborator failure
    Internal,
}

impl ApprovalError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoApplicableFlow { .. }
            | Self::UnsatisfiableStep { .. }
            | Self::DefaultFlowDeletion(_)
            | Self::InvalidDefinition(_)
            | Self::DelegationConflict { .. }
            | Self::InvalidDelegation(_)
            | Self::Configuration(_) => ErrorCategory::Configuration,
            Self::UnauthorizedApprover { .. } => ErrorCategory::Authorization,
            Self::OutOfOrderDecision { .. } | Self::StaleState { .. } => ErrorCategory::Ordering,
            Self::InstanceNotFound(_) | Self::FlowDefinitionNotFound(_) => ErrorCategory::NotFound,
            Self::Persistence(_) | Self::StateMachine(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the caller may retry after refreshing instance state
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Ordering
    }
}

impl From<serde_json::Error> for ApprovalError {
    fn from(error: serde_json::Error) -> Self {
        ApprovalError::Persistence(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, ApprovalError>;
