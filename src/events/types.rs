//! Lifecycle events emitted on every approval state transition, consumed by
//! the notification collaborator.

use crate::constants::events;
use crate::models::{DocumentType, FlowInstance, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalEventKind {
    StepActivated,
    StepSatisfied,
    StepRejected,
    StepSkipped,
    StepTimedOut,
    InstanceApproved,
    InstanceRejected,
    InstanceCancelled,
}

impl ApprovalEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StepActivated => events::STEP_ACTIVATED,
            Self::StepSatisfied => events::STEP_SATISFIED,
            Self::StepRejected => events::STEP_REJECTED,
            Self::StepSkipped => events::STEP_SKIPPED,
            Self::StepTimedOut => events::STEP_TIMED_OUT,
            Self::InstanceApproved => events::INSTANCE_APPROVED,
            Self::InstanceRejected => events::INSTANCE_REJECTED,
            Self::InstanceCancelled => events::INSTANCE_CANCELLED,
        }
    }

    pub fn is_instance_event(&self) -> bool {
        matches!(
            self,
            Self::InstanceApproved | Self::InstanceRejected | Self::InstanceCancelled
        )
    }
}

impl fmt::Display for ApprovalEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub kind: ApprovalEventKind,
    pub instance_id: Uuid,
    pub tenant_id: TenantId,
    pub document_type: DocumentType,
    pub document_id: String,
    /// Absent for instance-level events
    pub step_index: Option<usize>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ApprovalEvent {
    pub fn for_step(
        instance: &FlowInstance,
        kind: ApprovalEventKind,
        step_index: usize,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::build(instance, kind, Some(step_index), occurred_at)
    }

    pub fn for_instance(
        instance: &FlowInstance,
        kind: ApprovalEventKind,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::build(instance, kind, None, occurred_at)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn build(
        instance: &FlowInstance,
        kind: ApprovalEventKind,
        step_index: Option<usize>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            instance_id: instance.id,
            tenant_id: instance.tenant_id.clone(),
            document_type: instance.document_type,
            document_id: instance.document_id.clone(),
            step_index,
            reason: None,
            occurred_at,
        }
    }
}
