//! # Flow Definition Model
//!
//! Administrator-configured approval templates scoped to a tenant and a
//! document type.
//!
//! ## Overview
//!
//! A `FlowDefinition` owns an ordered list of [`StepDefinition`]s and an
//! unordered list of [`ConditionDefinition`]s. Conditions gate whether the
//! flow applies to a document at all (logical AND, empty means always); steps
//! describe who approves and in what order once the flow is chosen.
//!
//! ## Lifecycle
//!
//! Definitions are replaced wholesale: updating a flow recreates every step
//! and condition instead of diffing them. Flow instances carry a frozen copy
//! of the definition they started with, so edits and deletes never reach
//! documents already in flight.

use super::{DocumentType, TenantId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// How a flow derives its steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Steps follow the requester's reporting chain
    Organization,
    /// Steps are configured explicitly
    Custom,
}

/// Meaning relative to the approvers within one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Approvers decide one after another in `order` sequence
    #[default]
    Serial,
    /// Any eligible approver may decide at any time
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Abstract description of who may approve a step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApproverKind {
    /// A fixed user
    User { approver_id: UserId },
    /// Every active user in the tenant holding the role
    Role { approver_role: String },
    /// Every active user at the organizational level
    PositionLevel { position_level: u32 },
    /// The requester's ancestor in the reporting chain. The number of levels
    /// comes from the flow's `organization_levels`; `position_level` is only
    /// consulted when the flow leaves that unset.
    OrgHierarchy {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position_level: Option<u32>,
    },
}

impl ApproverKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Role { .. } => "role",
            Self::PositionLevel { .. } => "position_level",
            Self::OrgHierarchy { .. } => "org_hierarchy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverSpec {
    pub id: Uuid,
    pub step_id: Uuid,
    #[serde(flatten)]
    pub kind: ApproverKind,
    /// Tie-break and serial sequence index
    pub order: u32,
}

/// Comparison applied by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ConditionOperator {
    /// Ordering operators only make sense on numbers
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        };
        f.write_str(name)
    }
}

/// Predicate gating flow applicability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub id: Uuid,
    pub flow_id: Uuid,
    /// Dotted path into the document attributes, e.g. `amount` or `trip.days`
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
    pub description: Option<String>,
}

/// One stage of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: Uuid,
    pub flow_id: Uuid,
    /// 1-based, unique within the flow
    pub step_number: u32,
    pub name: String,
    pub execution_mode: ExecutionMode,
    /// Quorum of distinct approvals needed to satisfy the step
    pub required_approvals: u32,
    pub timeout_hours: Option<u32>,
    pub allow_delegate: bool,
    pub allow_skip: bool,
    pub approvers: Vec<ApproverSpec>,
}

impl StepDefinition {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_hours.map(|hours| Duration::hours(i64::from(hours)))
    }

    /// Approver specs in serial sequence
    pub fn ordered_approvers(&self) -> Vec<&ApproverSpec> {
        let mut approvers: Vec<&ApproverSpec> = self.approvers.iter().collect();
        approvers.sort_by_key(|spec| spec.order);
        approvers
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub document_type: DocumentType,
    pub flow_type: FlowType,
    pub use_organization_hierarchy: bool,
    /// Hierarchy levels to climb for organization flows and `org_hierarchy` approvers
    pub organization_levels: Option<u32>,
    pub is_active: bool,
    pub is_default: bool,
    /// Higher wins
    pub priority: i32,
    pub steps: Vec<StepDefinition>,
    pub conditions: Vec<ConditionDefinition>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowDefinition {
    /// Build a stored definition from administrator input, assigning ids
    pub fn from_new(new_flow: NewFlowDefinition, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        let mut flow = Self {
            id,
            tenant_id: new_flow.tenant_id,
            name: new_flow.name,
            document_type: new_flow.document_type,
            flow_type: new_flow.flow_type,
            use_organization_hierarchy: new_flow.use_organization_hierarchy,
            organization_levels: new_flow.organization_levels,
            is_active: new_flow.is_active,
            is_default: new_flow.is_default,
            priority: new_flow.priority,
            steps: Vec::new(),
            conditions: Vec::new(),
            created_by: new_flow.created_by,
            created_at: now,
            updated_at: now,
        };
        flow.replace_children(new_flow.steps, new_flow.conditions);
        flow
    }

    /// Drop every step and condition and recreate them from `steps` and `conditions`
    pub fn replace_children(
        &mut self,
        steps: Vec<NewStepDefinition>,
        conditions: Vec<NewConditionDefinition>,
    ) {
        let flow_id = self.id;
        let mut steps: Vec<StepDefinition> = steps
            .into_iter()
            .map(|step| step.into_step(flow_id))
            .collect();
        steps.sort_by_key(|step| step.step_number);
        self.steps = steps;
        self.conditions = conditions
            .into_iter()
            .map(|condition| ConditionDefinition {
                id: Uuid::new_v4(),
                flow_id,
                field: condition.field,
                operator: condition.operator,
                value: condition.value,
                description: condition.description,
            })
            .collect();
    }

    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Administrator input for creating or replacing a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlowDefinition {
    pub tenant_id: TenantId,
    pub name: String,
    pub document_type: DocumentType,
    pub flow_type: FlowType,
    #[serde(default)]
    pub use_organization_hierarchy: bool,
    pub organization_levels: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub steps: Vec<NewStepDefinition>,
    #[serde(default)]
    pub conditions: Vec<NewConditionDefinition>,
    pub created_by: UserId,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStepDefinition {
    pub step_number: u32,
    pub name: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    pub required_approvals: u32,
    pub timeout_hours: Option<u32>,
    #[serde(default)]
    pub allow_delegate: bool,
    #[serde(default)]
    pub allow_skip: bool,
    pub approvers: Vec<NewApproverSpec>,
}

impl NewStepDefinition {
    fn into_step(self, flow_id: Uuid) -> StepDefinition {
        let step_id = Uuid::new_v4();
        StepDefinition {
            id: step_id,
            flow_id,
            step_number: self.step_number,
            name: self.name,
            execution_mode: self.execution_mode,
            required_approvals: self.required_approvals,
            timeout_hours: self.timeout_hours,
            allow_delegate: self.allow_delegate,
            allow_skip: self.allow_skip,
            approvers: self
                .approvers
                .into_iter()
                .map(|approver| ApproverSpec {
                    id: Uuid::new_v4(),
                    step_id,
                    kind: approver.kind,
                    order: approver.order,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApproverSpec {
    #[serde(flatten)]
    pub kind: ApproverKind,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConditionDefinition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
    pub description: Option<String>,
}
