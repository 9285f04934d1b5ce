//! Shared fixtures for the integration tests: an engine wired to in-memory
//! collaborators, a small organization, and flow definition builders.

#![allow(dead_code)]

pub mod strategies;

use approval_core::clock::{Clock, ManualClock};
use approval_core::config::ApprovalConfig;
use approval_core::events::{ApprovalEvent, ApprovalEventKind};
use approval_core::models::{
    ApproverKind, ConditionOperator, DocumentAttributes, DocumentType, ExecutionMode, FlowType,
    NewApproverSpec, NewConditionDefinition, NewFlowDefinition, NewStepDefinition,
};
use approval_core::orchestration::{ApprovalEngine, EngineCollaborators};
use approval_core::persistence::{InMemoryFlowDefinitionStore, InMemoryFlowInstanceStore};
use approval_core::registry::{FlowRegistry, InMemoryDelegationRegistry};
use approval_core::services::{OrgUser, StaticOrgDirectory};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const TENANT: &str = "acme";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// emp -> lead -> head -> ceo, plus three HR staff and one finance officer
pub fn organization() -> StaticOrgDirectory {
    StaticOrgDirectory::new()
        .with_user(TENANT, OrgUser::new("emp").with_level(1).reporting_to("lead"))
        .with_user(TENANT, OrgUser::new("lead").with_level(2).reporting_to("head"))
        .with_user(TENANT, OrgUser::new("head").with_level(3).reporting_to("ceo"))
        .with_user(TENANT, OrgUser::new("ceo").with_level(4))
        .with_user(TENANT, OrgUser::new("hr-1").with_role("hr"))
        .with_user(TENANT, OrgUser::new("hr-2").with_role("hr"))
        .with_user(TENANT, OrgUser::new("hr-3").with_role("hr"))
        .with_user(TENANT, OrgUser::new("fin-1").with_role("finance"))
        .with_user("globex", OrgUser::new("hr-9").with_role("hr"))
}

/// Engine plus direct handles on every in-memory collaborator
pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub directory: Arc<StaticOrgDirectory>,
    pub definitions: Arc<InMemoryFlowDefinitionStore>,
    pub instances: Arc<InMemoryFlowInstanceStore>,
    pub delegations: Arc<InMemoryDelegationRegistry>,
    pub registry: FlowRegistry,
    pub engine: Arc<ApprovalEngine>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ApprovalConfig::default())
    }

    pub fn with_config(config: ApprovalConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let directory = Arc::new(organization());
        let definitions = Arc::new(InMemoryFlowDefinitionStore::new());
        let instances = Arc::new(InMemoryFlowInstanceStore::new());
        let delegations = Arc::new(InMemoryDelegationRegistry::new(shared_clock.clone()));

        let engine = ApprovalEngine::new(
            &config,
            EngineCollaborators {
                clock: shared_clock.clone(),
                directory: directory.clone(),
                definitions: definitions.clone(),
                instances: instances.clone(),
                delegations: delegations.clone(),
            },
        );
        let registry = FlowRegistry::new(definitions.clone(), shared_clock);

        Self {
            clock,
            directory,
            definitions,
            instances,
            delegations,
            registry,
            engine: Arc::new(engine),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.engine.subscribe()
    }
}

/// Builder for administrator flow input
pub struct FlowBuilder {
    flow: NewFlowDefinition,
}

impl FlowBuilder {
    pub fn custom(name: &str, document_type: DocumentType) -> Self {
        Self {
            flow: NewFlowDefinition {
                tenant_id: TENANT.to_string(),
                name: name.to_string(),
                document_type,
                flow_type: FlowType::Custom,
                use_organization_hierarchy: false,
                organization_levels: None,
                is_active: true,
                is_default: false,
                priority: 0,
                steps: Vec::new(),
                conditions: Vec::new(),
                created_by: "admin".to_string(),
            },
        }
    }

    pub fn organization(name: &str, document_type: DocumentType, levels: u32) -> Self {
        let mut builder = Self::custom(name, document_type);
        builder.flow.flow_type = FlowType::Organization;
        builder.flow.use_organization_hierarchy = true;
        builder.flow.organization_levels = Some(levels);
        builder
    }

    pub fn tenant(mut self, tenant_id: &str) -> Self {
        self.flow.tenant_id = tenant_id.to_string();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.flow.priority = priority;
        self
    }

    pub fn default_flow(mut self) -> Self {
        self.flow.is_default = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.flow.is_active = false;
        self
    }

    pub fn step(mut self, step: NewStepDefinition) -> Self {
        self.flow.steps.push(step);
        self
    }

    pub fn condition(mut self, field: &str, operator: ConditionOperator, value: Value) -> Self {
        self.flow.conditions.push(NewConditionDefinition {
            field: field.to_string(),
            operator,
            value,
            description: None,
        });
        self
    }

    pub fn build(self) -> NewFlowDefinition {
        self.flow
    }
}

fn step(
    step_number: u32,
    execution_mode: ExecutionMode,
    required_approvals: u32,
    approvers: Vec<NewApproverSpec>,
) -> NewStepDefinition {
    NewStepDefinition {
        step_number,
        name: format!("step {step_number}"),
        execution_mode,
        required_approvals,
        timeout_hours: None,
        allow_delegate: false,
        allow_skip: false,
        approvers,
    }
}

fn users(user_ids: &[&str]) -> Vec<NewApproverSpec> {
    user_ids
        .iter()
        .zip(1u32..)
        .map(|(user_id, order)| NewApproverSpec {
            kind: ApproverKind::User {
                approver_id: (*user_id).to_string(),
            },
            order,
        })
        .collect()
}

pub fn serial_step(step_number: u32, required_approvals: u32, user_ids: &[&str]) -> NewStepDefinition {
    step(step_number, ExecutionMode::Serial, required_approvals, users(user_ids))
}

pub fn parallel_step(step_number: u32, required_approvals: u32, user_ids: &[&str]) -> NewStepDefinition {
    step(step_number, ExecutionMode::Parallel, required_approvals, users(user_ids))
}

pub fn role_step(
    step_number: u32,
    execution_mode: ExecutionMode,
    required_approvals: u32,
    role: &str,
) -> NewStepDefinition {
    step(
        step_number,
        execution_mode,
        required_approvals,
        vec![NewApproverSpec {
            kind: ApproverKind::Role {
                approver_role: role.to_string(),
            },
            order: 1,
        }],
    )
}

pub fn attributes(value: Value) -> DocumentAttributes {
    value.as_object().cloned().unwrap_or_default()
}

/// Every event currently buffered on the receiver, oldest first
pub fn drain_events(receiver: &mut broadcast::Receiver<ApprovalEvent>) -> Vec<ApprovalEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[ApprovalEvent]) -> Vec<ApprovalEventKind> {
    events.iter().map(|event| event.kind).collect()
}
