//! # Approver Resolver
//!
//! Turns abstract approver specs into concrete user ids, and a deciding user
//! into the approver a decision is credited to.
//!
//! ## Resolution
//!
//! - `user`: the literal id
//! - `role`: every active tenant user holding the role
//! - `position_level`: every active tenant user at the level
//! - `org_hierarchy`: the requester's ancestor N levels up. N comes from the
//!   flow's `organization_levels`, then the approver's own level, then the
//!   configured default. A short chain resolves to its topmost manager and
//!   flags the step truncated.
//!
//! Ids are deduplicated per step, keeping the first occurrence, so a user
//! reached through two specs approves once and holds the earlier serial slot.
//!
//! ## Attribution
//!
//! A user who is a resolved approver always decides for themselves. Anyone
//! else may decide only on a step that allows delegation, and only for a
//! resolved approver who has delegated to them at the moment of decision.

use crate::error::Result;
use crate::models::{
    ApproverKind, ApproverSpec, DecisionAttribution, ExecutionMode, FlowDefinition, StepInstance,
    UserId,
};
use crate::services::OrgDirectory;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Concrete approvers of one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedApprovers {
    /// Serial sequence, without duplicates
    pub approver_ids: Vec<UserId>,
    pub hierarchy_truncated: bool,
}

impl ResolvedApprovers {
    fn push_unique(&mut self, seen: &mut HashSet<UserId>, id: UserId) {
        if seen.insert(id.clone()) {
            self.approver_ids.push(id);
        }
    }
}

/// Ancestor lookup result for one hierarchy level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyApprover {
    pub approver_id: Option<UserId>,
    pub truncated: bool,
}

/// Pick the ancestor `levels` steps up a chain ordered immediate manager first
pub fn ancestor_at(chain: &[UserId], levels: u32) -> HierarchyApprover {
    let wanted = usize::try_from(levels.max(1)).unwrap_or(usize::MAX);
    match chain.get(wanted - 1) {
        Some(ancestor) => HierarchyApprover {
            approver_id: Some(ancestor.clone()),
            truncated: false,
        },
        None => HierarchyApprover {
            approver_id: chain.last().cloned(),
            truncated: true,
        },
    }
}

pub struct ApproverResolver {
    directory: Arc<dyn OrgDirectory>,
    default_organization_levels: u32,
}

impl ApproverResolver {
    pub fn new(directory: Arc<dyn OrgDirectory>, default_organization_levels: u32) -> Self {
        Self {
            directory,
            default_organization_levels: default_organization_levels.max(1),
        }
    }

    /// Hierarchy depth for a flow, falling back to `spec_level` and then the default
    pub fn organization_levels(&self, flow: &FlowDefinition, spec_level: Option<u32>) -> u32 {
        flow.organization_levels
            .or(spec_level)
            .filter(|levels| *levels > 0)
            .unwrap_or(self.default_organization_levels)
    }

    pub async fn manager_chain(&self, user_id: &str) -> Result<Vec<UserId>> {
        self.directory.manager_chain(user_id).await
    }

    /// Resolve a step's specs in `order` sequence
    pub async fn resolve(
        &self,
        flow: &FlowDefinition,
        specs: &[&ApproverSpec],
        requester_id: &str,
    ) -> Result<ResolvedApprovers> {
        let mut resolved = ResolvedApprovers::default();
        let mut seen = HashSet::new();
        // Fetched at most once per step
        let mut chain: Option<Vec<UserId>> = None;

        for spec in specs {
            match &spec.kind {
                ApproverKind::User { approver_id } => {
                    resolved.push_unique(&mut seen, approver_id.clone());
                }
                ApproverKind::Role { approver_role } => {
                    let users = self
                        .directory
                        .users_with_role(&flow.tenant_id, approver_role)
                        .await?;
                    if users.is_empty() {
                        warn!(flow_id = %flow.id, role = %approver_role, "Role resolved to no active users");
                    }
                    for user in users {
                        resolved.push_unique(&mut seen, user);
                    }
                }
                ApproverKind::PositionLevel { position_level } => {
                    let users = self
                        .directory
                        .users_at_level(&flow.tenant_id, *position_level)
                        .await?;
                    if users.is_empty() {
                        warn!(flow_id = %flow.id, level = position_level, "Position level resolved to no active users");
                    }
                    for user in users {
                        resolved.push_unique(&mut seen, user);
                    }
                }
                ApproverKind::OrgHierarchy { position_level } => {
                    if chain.is_none() {
                        chain = Some(self.directory.manager_chain(requester_id).await?);
                    }
                    let levels = self.organization_levels(flow, *position_level);
                    let ancestor = ancestor_at(chain.as_deref().unwrap_or_default(), levels);
                    if ancestor.truncated {
                        warn!(
                            flow_id = %flow.id,
                            requester_id = %requester_id,
                            levels = levels,
                            "Reporting chain shorter than configured hierarchy levels"
                        );
                        resolved.hierarchy_truncated = true;
                    }
                    if let Some(approver_id) = ancestor.approver_id {
                        resolved.push_unique(&mut seen, approver_id);
                    }
                }
            }
        }

        debug!(
            flow_id = %flow.id,
            approvers = ?resolved.approver_ids,
            truncated = resolved.hierarchy_truncated,
            "Resolved step approvers"
        );
        Ok(resolved)
    }
}

/// Work out whom a decision by `user_id` counts for.
///
/// `delegators` are the users who have delegated to `user_id` at the moment
/// of decision. Returns `None` when the user may not decide on the step.
pub fn attribute_decision(
    step: &StepInstance,
    user_id: &str,
    delegators: &[UserId],
) -> Option<DecisionAttribution> {
    if step.is_resolved_approver(user_id) {
        return Some(DecisionAttribution::direct(user_id));
    }
    if !step.allow_delegate {
        return None;
    }

    let candidates: Vec<&UserId> = step
        .resolved_approver_ids
        .iter()
        .filter(|approver| delegators.contains(approver))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let undecided = || {
        candidates
            .iter()
            .find(|approver| step.decision_for(approver).is_none())
            .copied()
    };
    let chosen = match step.execution_mode {
        ExecutionMode::Serial => step
            .next_serial_approver()
            .filter(|expected| candidates.contains(expected))
            .or_else(undecided),
        ExecutionMode::Parallel => undecided(),
    }
    .unwrap_or(candidates[0]);

    Some(DecisionAttribution::delegated(chosen.clone(), user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, FlowType, NewFlowDefinition};
    use crate::services::{OrgUser, StaticOrgDirectory};
    use crate::state_machine::StepState;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn directory() -> Arc<StaticOrgDirectory> {
        Arc::new(
            StaticOrgDirectory::new()
                .with_user("acme", OrgUser::new("emp").reporting_to("lead"))
                .with_user("acme", OrgUser::new("lead").with_level(2).with_role("manager").reporting_to("head"))
                .with_user("acme", OrgUser::new("head").with_level(3).with_role("manager"))
                .with_user("acme", OrgUser::new("hr-1").with_role("hr").with_level(2)),
        )
    }

    fn flow(levels: Option<u32>) -> FlowDefinition {
        FlowDefinition::from_new(
            NewFlowDefinition {
                tenant_id: "acme".to_string(),
                name: "flow".to_string(),
                document_type: DocumentType::ExpenseClaim,
                flow_type: FlowType::Custom,
                use_organization_hierarchy: false,
                organization_levels: levels,
                is_active: true,
                is_default: false,
                priority: 0,
                steps: Vec::new(),
                conditions: Vec::new(),
                created_by: "admin".to_string(),
            },
            Utc::now(),
        )
    }

    fn spec(kind: ApproverKind, order: u32) -> ApproverSpec {
        ApproverSpec {
            id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            kind,
            order,
        }
    }

    #[tokio::test]
    async fn test_resolution_deduplicates_in_order() {
        let resolver = ApproverResolver::new(directory(), 1);
        let specs = [
            spec(ApproverKind::Role { approver_role: "manager".to_string() }, 1),
            spec(ApproverKind::PositionLevel { position_level: 2 }, 2),
            spec(ApproverKind::User { approver_id: "head".to_string() }, 3),
        ];
        let refs: Vec<&ApproverSpec> = specs.iter().collect();

        let resolved = resolver.resolve(&flow(None), &refs, "emp").await.unwrap();
        assert_eq!(resolved.approver_ids, vec!["head", "lead", "hr-1"]);
        assert!(!resolved.hierarchy_truncated);
    }

    #[tokio::test]
    async fn test_org_hierarchy_uses_flow_levels_and_truncates() {
        let resolver = ApproverResolver::new(directory(), 1);
        let specs = [spec(ApproverKind::OrgHierarchy { position_level: Some(1) }, 1)];
        let refs: Vec<&ApproverSpec> = specs.iter().collect();

        let resolved = resolver.resolve(&flow(Some(2)), &refs, "emp").await.unwrap();
        assert_eq!(resolved.approver_ids, vec!["head"]);

        let resolved = resolver.resolve(&flow(None), &refs, "emp").await.unwrap();
        assert_eq!(resolved.approver_ids, vec!["lead"]);

        let resolved = resolver.resolve(&flow(Some(5)), &refs, "emp").await.unwrap();
        assert_eq!(resolved.approver_ids, vec!["head"]);
        assert!(resolved.hierarchy_truncated);

        let resolved = resolver.resolve(&flow(Some(1)), &refs, "head").await.unwrap();
        assert!(resolved.approver_ids.is_empty());
        assert!(resolved.hierarchy_truncated);
    }

    fn active_step(mode: ExecutionMode, approvers: &[&str], allow_delegate: bool) -> StepInstance {
        StepInstance {
            step_index: 0,
            step_definition_id: None,
            step_number: 1,
            name: "review".to_string(),
            execution_mode: mode,
            required_approvals: 1,
            timeout_hours: None,
            allow_delegate,
            allow_skip: false,
            status: StepState::Active,
            activated_at: None,
            deadline_at: None,
            completed_at: None,
            resolved_approver_ids: approvers.iter().map(|a| a.to_string()).collect(),
            active_delegations: BTreeMap::new(),
            decisions: Vec::new(),
            hierarchy_truncated: false,
            unsatisfiable: false,
            reason: None,
        }
    }

    #[test]
    fn test_direct_approver_takes_precedence() {
        let step = active_step(ExecutionMode::Parallel, &["a", "b"], true);
        let attribution = attribute_decision(&step, "b", &["a".to_string()]).unwrap();
        assert_eq!(attribution, DecisionAttribution::direct("b"));
    }

    #[test]
    fn test_delegate_acts_for_expected_serial_approver() {
        let step = active_step(ExecutionMode::Serial, &["a", "b", "c"], true);
        let delegators = vec!["c".to_string(), "a".to_string()];
        let attribution = attribute_decision(&step, "x", &delegators).unwrap();
        assert_eq!(attribution, DecisionAttribution::delegated("a", "x"));
    }

    #[test]
    fn test_delegation_requires_step_permission_and_membership() {
        let step = active_step(ExecutionMode::Parallel, &["a"], false);
        assert_eq!(attribute_decision(&step, "x", &["a".to_string()]), None);

        let step = active_step(ExecutionMode::Parallel, &["a"], true);
        assert_eq!(attribute_decision(&step, "x", &["z".to_string()]), None);
    }

    #[test]
    fn test_ancestor_at() {
        let chain = vec!["m1".to_string(), "m2".to_string()];
        assert_eq!(ancestor_at(&chain, 2).approver_id.as_deref(), Some("m2"));
        assert!(ancestor_at(&chain, 3).truncated);
        assert_eq!(ancestor_at(&[], 1).approver_id, None);
    }
}
