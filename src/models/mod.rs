//! # Models
//!
//! Data layer of the approval engine.
//!
//! - [`flow_definition`] - administrator-configured routing templates (flows,
//!   steps, approver specs, conditions)
//! - [`flow_instance`] - the live execution of one flow against one document
//! - [`delegation`] - time-bounded transfer of approval authority
//! - [`document_type`] - the closed set of routable business documents

pub mod delegation;
pub mod document_type;
pub mod flow_definition;
pub mod flow_instance;

pub use delegation::{DelegationRecord, NewDelegation};
pub use document_type::DocumentType;
pub use flow_definition::{
    ApproverKind, ApproverSpec, ConditionDefinition, ConditionOperator, ExecutionMode,
    FlowDefinition, FlowType, NewApproverSpec, NewConditionDefinition, NewFlowDefinition,
    NewStepDefinition, StepDefinition,
};
pub use flow_instance::{
    Decision, DecisionAttribution, DocumentAttributes, FlowInstance, StepDecision, StepInstance,
};

/// Opaque user identifier supplied by the identity collaborator
pub type UserId = String;

/// Opaque tenant identifier supplied by tenant resolution
pub type TenantId = String;
