//! # Flow Instance Model
//!
//! The execution of one frozen [`FlowDefinition`] against one document.
//!
//! Each instance owns one [`StepInstance`] per step, materialized at
//! submission. `version` is bumped by the instance store on every successful
//! save and is the optimistic concurrency token for decision recording,
//! cancellation and timeout sweeps.

use super::{DocumentType, ExecutionMode, FlowDefinition, TenantId, UserId};
use crate::state_machine::states::{InstanceState, StepState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Flat snapshot of document fields taken at submission time
pub type DocumentAttributes = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Who a decision counts for and who actually made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionAttribution {
    /// The resolved approver the decision is credited to
    pub approver_id: UserId,
    /// The user who called `decide`
    pub decided_by: UserId,
    /// Set when `decided_by` acted under a delegation from `approver_id`
    pub delegated_from: Option<UserId>,
}

impl DecisionAttribution {
    pub fn direct(approver_id: impl Into<UserId>) -> Self {
        let approver_id = approver_id.into();
        Self {
            decided_by: approver_id.clone(),
            approver_id,
            delegated_from: None,
        }
    }

    pub fn delegated(delegator_id: impl Into<UserId>, delegate_id: impl Into<UserId>) -> Self {
        let delegator_id = delegator_id.into();
        Self {
            approver_id: delegator_id.clone(),
            decided_by: delegate_id.into(),
            delegated_from: Some(delegator_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDecision {
    pub approver_id: UserId,
    pub decided_by: UserId,
    pub delegated_from: Option<UserId>,
    pub decision: Decision,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Runtime state of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInstance {
    pub step_index: usize,
    /// `None` for steps synthesized from the reporting chain
    pub step_definition_id: Option<Uuid>,
    pub step_number: u32,
    pub name: String,
    pub execution_mode: ExecutionMode,
    pub required_approvals: u32,
    pub timeout_hours: Option<u32>,
    pub allow_delegate: bool,
    pub allow_skip: bool,
    pub status: StepState,
    pub activated_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Concrete approvers in serial sequence, deduplicated
    pub resolved_approver_ids: Vec<UserId>,
    /// Delegations in force when the step activated, delegator -> delegate
    pub active_delegations: BTreeMap<UserId, UserId>,
    pub decisions: Vec<StepDecision>,
    /// The reporting chain was shorter than the configured level
    pub hierarchy_truncated: bool,
    /// Fewer approvers resolved than `required_approvals`
    pub unsatisfiable: bool,
    pub reason: Option<String>,
}

impl StepInstance {
    pub fn is_resolved_approver(&self, user_id: &str) -> bool {
        self.resolved_approver_ids.iter().any(|id| id == user_id)
    }

    pub fn decision_for(&self, approver_id: &str) -> Option<&StepDecision> {
        self.decisions
            .iter()
            .find(|decision| decision.approver_id == approver_id)
    }

    pub fn approval_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|decision| decision.decision == Decision::Approve)
            .count()
    }

    pub fn has_rejection(&self) -> bool {
        self.decisions
            .iter()
            .any(|decision| decision.decision == Decision::Reject)
    }

    /// The approver whose turn it is in a serial step
    pub fn next_serial_approver(&self) -> Option<&UserId> {
        self.resolved_approver_ids
            .iter()
            .find(|id| self.decision_for(id).is_none())
    }

    /// Resolved approvers that have not decided yet
    pub fn undecided_approvers(&self) -> impl Iterator<Item = &UserId> {
        self.resolved_approver_ids
            .iter()
            .filter(|id| self.decision_for(id).is_none())
    }

    pub fn is_overdue(&self, as_of: DateTime<Utc>) -> bool {
        self.status == StepState::Active
            && self.deadline_at.map(|deadline| as_of > deadline).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstance {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub flow_definition_id: Uuid,
    /// Frozen copy of the definition selected at submission
    pub flow_snapshot: FlowDefinition,
    pub document_type: DocumentType,
    pub document_id: String,
    pub requester_id: UserId,
    pub attributes: DocumentAttributes,
    pub current_step_index: usize,
    pub status: InstanceState,
    pub steps: Vec<StepInstance>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub version: u64,
}

impl FlowInstance {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn current_step(&self) -> Option<&StepInstance> {
        self.steps.get(self.current_step_index)
    }

    /// The step currently awaiting decisions, if any
    pub fn active_step(&self) -> Option<&StepInstance> {
        self.current_step()
            .filter(|step| step.status == StepState::Active)
    }

    pub fn active_step_mut(&mut self) -> Option<&mut StepInstance> {
        self.steps
            .get_mut(self.current_step_index)
            .filter(|step| step.status == StepState::Active)
    }

    /// Most recent step, at or before the current one, in which `user_id`
    /// is a resolved approver
    pub fn latest_step_for(&self, user_id: &str) -> Option<&StepInstance> {
        self.steps
            .iter()
            .take(self.current_step_index + 1)
            .rev()
            .find(|step| step.is_resolved_approver(user_id))
    }
}
