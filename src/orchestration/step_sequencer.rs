//! # Step Sequencer
//!
//! Materializes the ordered step instances of a new flow instance.
//!
//! Custom flows get one step per step definition, in `step_number` order.
//! Organization flows without explicit steps get one serial single-approver
//! step per hierarchy level, each bound to the requester's ancestor at that
//! level. A step that resolves fewer approvers than its quorum is marked
//! unsatisfiable; the engine decides at submission what that means.

use super::approver_resolver::{ancestor_at, ApproverResolver};
use crate::error::Result;
use crate::models::{
    ExecutionMode, FlowDefinition, FlowType, StepDefinition, StepInstance, UserId,
};
use crate::state_machine::StepState;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub struct StepSequencer<'a> {
    resolver: &'a ApproverResolver,
}

impl<'a> StepSequencer<'a> {
    pub fn new(resolver: &'a ApproverResolver) -> Self {
        Self { resolver }
    }

    pub async fn materialize(&self, flow: &FlowDefinition, requester_id: &str) -> Result<Vec<StepInstance>> {
        let steps = if flow.flow_type == FlowType::Organization && flow.steps.is_empty() {
            self.hierarchy_steps(flow, requester_id).await?
        } else {
            self.defined_steps(flow, requester_id).await?
        };

        for step in steps.iter().filter(|step| step.unsatisfiable) {
            warn!(
                flow_id = %flow.id,
                step_number = step.step_number,
                resolved = step.resolved_approver_ids.len(),
                required = step.required_approvals,
                allow_skip = step.allow_skip,
                "Step cannot reach its quorum"
            );
        }
        debug!(flow_id = %flow.id, steps = steps.len(), "Materialized steps");
        Ok(steps)
    }

    async fn defined_steps(&self, flow: &FlowDefinition, requester_id: &str) -> Result<Vec<StepInstance>> {
        let mut definitions: Vec<&StepDefinition> = flow.steps.iter().collect();
        definitions.sort_by_key(|step| step.step_number);

        let mut steps = Vec::with_capacity(definitions.len());
        for (index, definition) in definitions.into_iter().enumerate() {
            let resolved = self
                .resolver
                .resolve(flow, &definition.ordered_approvers(), requester_id)
                .await?;
            let mut step = blank_step(index, definition.step_number, definition.name.clone());
            step.step_definition_id = Some(definition.id);
            step.execution_mode = definition.execution_mode;
            step.required_approvals = definition.required_approvals;
            step.timeout_hours = definition.timeout_hours;
            step.allow_delegate = definition.allow_delegate;
            step.allow_skip = definition.allow_skip;
            step.hierarchy_truncated = resolved.hierarchy_truncated;
            step.resolved_approver_ids = resolved.approver_ids;
            step.unsatisfiable = is_short(&step);
            steps.push(step);
        }
        Ok(steps)
    }

    async fn hierarchy_steps(&self, flow: &FlowDefinition, requester_id: &str) -> Result<Vec<StepInstance>> {
        let levels = self.resolver.organization_levels(flow, None);
        let chain = self.resolver.manager_chain(requester_id).await?;

        let mut steps: Vec<StepInstance> = Vec::new();
        for level in 1..=levels {
            let ancestor = ancestor_at(&chain, level);
            if ancestor.truncated {
                // The top of a short chain approves once, not once per missing level
                if let Some(last) = steps.last_mut() {
                    last.hierarchy_truncated = true;
                    break;
                }
            }
            let mut step = blank_step(steps.len(), level, format!("Level {level} approval"));
            step.allow_delegate = true;
            step.hierarchy_truncated = ancestor.truncated;
            step.resolved_approver_ids = ancestor.approver_id.into_iter().collect();
            step.unsatisfiable = is_short(&step);
            steps.push(step);
            if ancestor.truncated {
                break;
            }
        }
        Ok(steps)
    }
}

fn is_short(step: &StepInstance) -> bool {
    let required = usize::try_from(step.required_approvals).unwrap_or(usize::MAX);
    step.resolved_approver_ids.len() < required
}

fn blank_step(step_index: usize, step_number: u32, name: String) -> StepInstance {
    StepInstance {
        step_index,
        step_definition_id: None,
        step_number,
        name,
        execution_mode: ExecutionMode::Serial,
        required_approvals: 1,
        timeout_hours: None,
        allow_delegate: false,
        allow_skip: false,
        status: StepState::Waiting,
        activated_at: None,
        deadline_at: None,
        completed_at: None,
        resolved_approver_ids: Vec::<UserId>::new(),
        active_delegations: BTreeMap::new(),
        decisions: Vec::new(),
        hierarchy_truncated: false,
        unsatisfiable: false,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApproverKind, DocumentType, NewApproverSpec, NewFlowDefinition, NewStepDefinition,
    };
    use crate::services::{OrgUser, StaticOrgDirectory};
    use chrono::Utc;
    use std::sync::Arc;

    fn resolver() -> ApproverResolver {
        let directory = StaticOrgDirectory::new()
            .with_user("acme", OrgUser::new("emp").reporting_to("lead"))
            .with_user("acme", OrgUser::new("lead").reporting_to("head"))
            .with_user("acme", OrgUser::new("head"))
            .with_user("acme", OrgUser::new("fin-1").with_role("finance"));
        ApproverResolver::new(Arc::new(directory), 1)
    }

    fn flow(flow_type: FlowType, levels: Option<u32>, steps: Vec<NewStepDefinition>) -> FlowDefinition {
        FlowDefinition::from_new(
            NewFlowDefinition {
                tenant_id: "acme".to_string(),
                name: "flow".to_string(),
                document_type: DocumentType::PurchaseRequest,
                flow_type,
                use_organization_hierarchy: flow_type == FlowType::Organization,
                organization_levels: levels,
                is_active: true,
                is_default: false,
                priority: 0,
                steps,
                conditions: Vec::new(),
                created_by: "admin".to_string(),
            },
            Utc::now(),
        )
    }

    fn role_step(step_number: u32, role: &str, required: u32, allow_skip: bool) -> NewStepDefinition {
        NewStepDefinition {
            step_number,
            name: format!("{role} review"),
            execution_mode: ExecutionMode::Parallel,
            required_approvals: required,
            timeout_hours: Some(8),
            allow_delegate: false,
            allow_skip,
            approvers: vec![NewApproverSpec {
                kind: ApproverKind::Role {
                    approver_role: role.to_string(),
                },
                order: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_custom_steps_follow_step_number() {
        let resolver = resolver();
        let flow = flow(
            FlowType::Custom,
            None,
            vec![role_step(2, "finance", 1, false), role_step(1, "finance", 2, true)],
        );

        let steps = StepSequencer::new(&resolver).materialize(&flow, "emp").await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_number, 1);
        assert_eq!(steps[0].step_index, 0);
        assert!(steps[0].unsatisfiable);
        assert!(!steps[1].unsatisfiable);
        assert_eq!(steps[1].resolved_approver_ids, vec!["fin-1"]);
        assert!(steps.iter().all(|step| step.status == StepState::Waiting));
        assert_eq!(steps[1].step_definition_id, Some(flow.steps[1].id));
    }

    #[tokio::test]
    async fn test_hierarchy_steps_one_per_level() {
        let resolver = resolver();
        let steps = StepSequencer::new(&resolver)
            .materialize(&flow(FlowType::Organization, Some(2), Vec::new()), "emp")
            .await
            .unwrap();
        let approvers: Vec<&str> = steps
            .iter()
            .map(|step| step.resolved_approver_ids[0].as_str())
            .collect();
        assert_eq!(approvers, vec!["lead", "head"]);
        assert!(steps.iter().all(|step| !step.hierarchy_truncated));
    }

    #[tokio::test]
    async fn test_short_chain_stops_at_top_and_flags_truncation() {
        let resolver = resolver();
        let steps = StepSequencer::new(&resolver)
            .materialize(&flow(FlowType::Organization, Some(4), Vec::new()), "emp")
            .await
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[1].hierarchy_truncated);
        assert_eq!(steps[1].resolved_approver_ids, vec!["head"]);

        let steps = StepSequencer::new(&resolver)
            .materialize(&flow(FlowType::Organization, Some(1), Vec::new()), "head")
            .await
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].unsatisfiable);
    }
}
