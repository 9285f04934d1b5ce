//! # Approval Engine
//!
//! The collaborator-facing API: submit a document, record decisions, cancel,
//! sweep timeouts, and query instances.
//!
//! ## Overview
//!
//! Each operation is one request-scoped call. State changes are computed by
//! the pure [`InstanceStateMachine`] on a copy of the stored instance and
//! written back with a compare-and-swap on `version`. A write that loses the
//! race is recomputed from the fresh instance, which is how two concurrent
//! approvals both count and how a decision arriving after the step settled
//! is turned into a no-op or `StaleState`.
//!
//! Events are published only after the write that produced them succeeded.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use approval_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<ApprovalEngine>) -> Result<()> {
//! let mut attributes = DocumentAttributes::new();
//! attributes.insert("days".to_string(), serde_json::json!(5));
//!
//! let instance = engine
//!     .submit("acme", DocumentType::LeaveRequest, "leave-42", "emp-7", attributes)
//!     .await?;
//! let instance = engine.decide(instance.id, "lead-3", Decision::Approve, None).await?;
//! println!("instance is {}", instance.status);
//! # Ok(())
//! # }
//! ```

use super::approver_resolver::{attribute_decision, ApproverResolver};
use super::flow_selector::FlowSelector;
use super::step_sequencer::StepSequencer;
use crate::clock::Clock;
use crate::config::ApprovalConfig;
use crate::error::{ApprovalError, Result};
use crate::events::{ApprovalEvent, ApprovalEventKind, EventPublisher};
use crate::logging::{log_flow_operation, log_step_operation};
use crate::models::{
    Decision, DecisionAttribution, DocumentAttributes, DocumentType, ExecutionMode, FlowInstance,
};
use crate::persistence::{FlowDefinitionStore, FlowInstanceStore, PersistenceError};
use crate::registry::DelegationRegistry;
use crate::services::OrgDirectory;
use crate::state_machine::{
    GuardError, InstanceState, InstanceStateMachine, StateMachineError, StepState,
};
use crate::validation::validate_document_attributes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// External collaborators the engine is wired to
#[derive(Clone)]
pub struct EngineCollaborators {
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<dyn OrgDirectory>,
    pub definitions: Arc<dyn FlowDefinitionStore>,
    pub instances: Arc<dyn FlowInstanceStore>,
    pub delegations: Arc<dyn DelegationRegistry>,
}

/// What a decision call should do once authorization is settled
enum DecisionPlan {
    Apply(DecisionAttribution),
    /// Nothing to change; return the instance as it is
    NoOp,
}

pub struct ApprovalEngine {
    max_conflict_retries: u32,
    clock: Arc<dyn Clock>,
    selector: FlowSelector,
    resolver: ApproverResolver,
    instances: Arc<dyn FlowInstanceStore>,
    delegations: Arc<dyn DelegationRegistry>,
    publisher: EventPublisher,
}

impl ApprovalEngine {
    pub fn new(config: &ApprovalConfig, collaborators: EngineCollaborators) -> Self {
        Self {
            max_conflict_retries: config.engine.max_conflict_retries,
            clock: collaborators.clock,
            selector: FlowSelector::new(collaborators.definitions),
            resolver: ApproverResolver::new(
                collaborators.directory,
                config.engine.default_organization_levels,
            ),
            instances: collaborators.instances,
            delegations: collaborators.delegations,
            publisher: EventPublisher::new(config.events.channel_capacity),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.publisher.subscribe()
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Route a submitted document and start its approval flow.
    ///
    /// Fails with `NoApplicableFlow` when no definition applies and with
    /// `UnsatisfiableStep` when a step that may not be skipped cannot reach
    /// its quorum. In both cases nothing is stored.
    pub async fn submit(
        &self,
        tenant_id: &str,
        document_type: DocumentType,
        document_id: &str,
        requester_id: &str,
        attributes: DocumentAttributes,
    ) -> Result<FlowInstance> {
        validate_document_attributes(&attributes)?;

        let selection = self
            .selector
            .select_with_diagnostics(tenant_id, document_type, &attributes)
            .await?;
        for invalid in &selection.invalid_conditions {
            warn!(
                flow_id = %invalid.flow_id,
                condition_id = %invalid.condition_id,
                field = %invalid.field,
                reason = %invalid.reason,
                "Invalid condition encountered during flow selection"
            );
        }
        let flow = selection.flow;

        let steps = StepSequencer::new(&self.resolver)
            .materialize(&flow, requester_id)
            .await?;
        if steps.is_empty() {
            return Err(ApprovalError::InvalidDefinition(format!(
                "flow {} produced no steps",
                flow.id
            )));
        }
        if let Some(step) = steps.iter().find(|step| step.unsatisfiable && !step.allow_skip) {
            warn!(
                flow_id = %flow.id,
                step_number = step.step_number,
                document_id = %document_id,
                "Refusing submission with an unsatisfiable step"
            );
            return Err(ApprovalError::UnsatisfiableStep {
                flow_id: flow.id,
                step_number: step.step_number,
                resolved: step.resolved_approver_ids.len(),
                required: step.required_approvals,
            });
        }

        let now = self.clock.now();
        let mut instance = FlowInstance {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            flow_definition_id: flow.id,
            flow_snapshot: flow,
            document_type,
            document_id: document_id.to_string(),
            requester_id: requester_id.to_string(),
            attributes,
            current_step_index: 0,
            status: InstanceState::Pending,
            steps,
            started_at: now,
            completed_at: None,
            reason: None,
            version: 0,
        };

        let events = InstanceStateMachine::new(&mut instance).start(now)?;
        self.snapshot_delegations(&mut instance, &events, now).await?;
        let instance = self.instances.insert(instance).await?;

        log_flow_operation(
            "submit",
            Some(instance.flow_definition_id),
            Some(instance.id),
            Some(&instance.tenant_id),
            &instance.status.to_string(),
            Some(&format!(
                "{} {} by {}, {} step(s)",
                instance.document_type,
                instance.document_id,
                instance.requester_id,
                instance.steps.len()
            )),
            now,
        );
        self.publish(events);
        Ok(instance)
    }

    /// Record `user_id`'s decision on the instance's active step
    pub async fn decide(
        &self,
        instance_id: Uuid,
        user_id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<FlowInstance> {
        for attempt in 0..=self.max_conflict_retries {
            let instance = self.instance(instance_id).await?;
            let now = self.clock.now();

            let attribution = match self.plan_decision(&instance, user_id, decision, now).await {
                Ok(DecisionPlan::Apply(attribution)) => attribution,
                Ok(DecisionPlan::NoOp) => {
                    debug!(
                        instance_id = %instance_id,
                        user_id = %user_id,
                        decision = %decision,
                        "Decision changes nothing"
                    );
                    return Ok(instance);
                }
                Err(error) => return Err(self.refused(instance_id, user_id, error)),
            };

            let mut updated = instance.clone();
            let step_index = updated.current_step_index;
            let events = InstanceStateMachine::new(&mut updated)
                .record_decision(&attribution, decision, comment.clone(), now)
                .map_err(|error| {
                    self.refused(instance_id, user_id, guard_to_approval_error(instance_id, user_id, error))
                })?;
            self.snapshot_delegations(&mut updated, &events, now).await?;

            match self.instances.save(updated).await {
                Ok(saved) => {
                    log_step_operation(
                        "decide",
                        instance_id,
                        step_index,
                        Some(&attribution.approver_id),
                        &decision.to_string(),
                        attribution
                            .delegated_from
                            .as_ref()
                            .map(|_| format!("decided by delegate {}", attribution.decided_by))
                            .as_deref(),
                        now,
                    );
                    self.publish(events);
                    return Ok(saved);
                }
                Err(PersistenceError::ConcurrentModification { .. }) => {
                    debug!(instance_id = %instance_id, attempt = attempt, "Decision lost a write race, retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(self.refused(instance_id, user_id, self.exhausted(instance_id)))
    }

    /// Withdraw an instance. Cancelling a finished instance returns it unchanged.
    pub async fn cancel(&self, instance_id: Uuid) -> Result<FlowInstance> {
        for attempt in 0..=self.max_conflict_retries {
            let instance = self.instance(instance_id).await?;
            if instance.is_terminal() {
                debug!(instance_id = %instance_id, status = %instance.status, "Cancel on finished instance ignored");
                return Ok(instance);
            }

            let now = self.clock.now();
            let mut updated = instance.clone();
            let events = InstanceStateMachine::new(&mut updated).cancel(now)?;

            match self.instances.save(updated).await {
                Ok(saved) => {
                    log_flow_operation(
                        "cancel",
                        Some(saved.flow_definition_id),
                        Some(instance_id),
                        Some(&saved.tenant_id),
                        &saved.status.to_string(),
                        None,
                        now,
                    );
                    self.publish(events);
                    return Ok(saved);
                }
                Err(PersistenceError::ConcurrentModification { .. }) => {
                    debug!(instance_id = %instance_id, attempt = attempt, "Cancel lost a write race, retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Err(self.exhausted(instance_id))
    }

    /// Escalate every active step whose deadline passed before `as_of`.
    ///
    /// Returns the instances this call changed. Running the sweep again, or
    /// concurrently, never escalates a step twice. An instance that fails to
    /// escalate is logged and left for the next sweep; the rest still run.
    pub async fn sweep_timeouts(&self, as_of: DateTime<Utc>) -> Result<Vec<FlowInstance>> {
        let candidates = self.instances.list_pending().await?;
        let mut mutated = Vec::new();
        let mut failed = 0usize;

        for candidate in candidates {
            let overdue = candidate
                .active_step()
                .is_some_and(|step| step.is_overdue(as_of));
            if !overdue {
                continue;
            }
            match self.escalate(candidate.id, as_of).await {
                Ok(Some(saved)) => mutated.push(saved),
                Ok(None) => {}
                Err(error) => {
                    failed += 1;
                    warn!(
                        instance_id = %candidate.id,
                        error = %error,
                        "Timeout escalation failed, leaving instance for the next sweep"
                    );
                }
            }
        }

        if !mutated.is_empty() || failed > 0 {
            info!(
                as_of = %as_of,
                escalated = mutated.len(),
                failed = failed,
                "Timeout sweep finished"
            );
        }
        Ok(mutated)
    }

    pub async fn instance(&self, instance_id: Uuid) -> Result<FlowInstance> {
        self.instances
            .get(instance_id)
            .await?
            .ok_or(ApprovalError::InstanceNotFound(instance_id))
    }

    pub async fn instances_for_document(
        &self,
        document_type: DocumentType,
        document_id: &str,
    ) -> Result<Vec<FlowInstance>> {
        Ok(self
            .instances
            .find_by_document(document_type, document_id)
            .await?)
    }

    /// Pending instances whose active step is waiting on `user_id`, directly
    /// or through a delegation in force at `as_of`
    pub async fn pending_for_approver(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Vec<FlowInstance>> {
        let delegators = self.delegations.delegators_for(user_id, as_of).await?;
        let pending = self.instances.list_pending().await?;

        Ok(pending
            .into_iter()
            .filter(|instance| {
                let Some(step) = instance.active_step() else {
                    return false;
                };
                let Some(attribution) = attribute_decision(step, user_id, &delegators) else {
                    return false;
                };
                match step.execution_mode {
                    ExecutionMode::Serial => {
                        step.next_serial_approver() == Some(&attribution.approver_id)
                    }
                    ExecutionMode::Parallel => step.decision_for(&attribution.approver_id).is_none(),
                }
            })
            .collect())
    }

    async fn escalate(&self, instance_id: Uuid, as_of: DateTime<Utc>) -> Result<Option<FlowInstance>> {
        for attempt in 0..=self.max_conflict_retries {
            let instance = self.instance(instance_id).await?;
            let mut updated = instance.clone();
            let events = InstanceStateMachine::new(&mut updated).apply_timeout(as_of)?;
            if events.is_empty() {
                // Another sweep or a decision got there first
                return Ok(None);
            }
            self.snapshot_delegations(&mut updated, &events, as_of).await?;

            match self.instances.save(updated).await {
                Ok(saved) => {
                    log_flow_operation(
                        "timeout",
                        Some(saved.flow_definition_id),
                        Some(instance_id),
                        Some(&saved.tenant_id),
                        &saved.status.to_string(),
                        Some(&format!("{} event(s)", events.len())),
                        as_of,
                    );
                    self.publish(events);
                    return Ok(Some(saved));
                }
                Err(PersistenceError::ConcurrentModification { .. }) => {
                    debug!(instance_id = %instance_id, attempt = attempt, "Timeout lost a write race, retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        warn!(instance_id = %instance_id, "Giving up on timeout escalation after repeated write conflicts");
        Ok(None)
    }

    /// Settle who a decision counts for, or why it is refused or moot
    async fn plan_decision(
        &self,
        instance: &FlowInstance,
        user_id: &str,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<DecisionPlan> {
        let delegators = self.delegations.delegators_for(user_id, now).await?;

        if instance.status == InstanceState::Cancelled {
            return Err(stale(instance.id, "instance was cancelled"));
        }

        if let Some(step) = instance.active_step() {
            if let Some(attribution) = attribute_decision(step, user_id, &delegators) {
                return match step.decision_for(&attribution.approver_id) {
                    None => Ok(DecisionPlan::Apply(attribution)),
                    Some(previous) if previous.decision == decision => Ok(DecisionPlan::NoOp),
                    Some(previous) => Err(stale(
                        instance.id,
                        format!("{} already recorded {}", attribution.approver_id, previous.decision),
                    )),
                };
            }
        }

        // Not an approver of the active step; maybe of one that already settled
        let settled = instance
            .steps
            .iter()
            .take(instance.current_step_index + 1)
            .rev()
            .filter(|step| step.status != StepState::Active)
            .find(|step| attribute_decision(step, user_id, &delegators).is_some());

        match settled {
            Some(step)
                if decision == Decision::Approve
                    && matches!(step.status, StepState::Satisfied | StepState::Skipped) =>
            {
                Ok(DecisionPlan::NoOp)
            }
            Some(step) => Err(stale(
                instance.id,
                format!("step {} is already {}", step.step_number, step.status),
            )),
            None => {
                // An approver of a step the flow has not reached is early, not unauthorized
                let upcoming = instance
                    .steps
                    .iter()
                    .skip(instance.current_step_index + 1)
                    .find(|step| attribute_decision(step, user_id, &delegators).is_some());
                match upcoming {
                    Some(step) if instance.is_terminal() => Err(stale(
                        instance.id,
                        format!(
                            "step {} was never reached, instance is {}",
                            step.step_number, instance.status
                        ),
                    )),
                    Some(step) => Err(stale(
                        instance.id,
                        format!("step {} is not active yet", step.step_number),
                    )),
                    None => Err(ApprovalError::UnauthorizedApprover {
                        instance_id: instance.id,
                        approver_id: user_id.to_string(),
                    }),
                }
            }
        }
    }

    /// Record the delegations in force for every step that just activated
    async fn snapshot_delegations(
        &self,
        instance: &mut FlowInstance,
        events: &[ApprovalEvent],
        at: DateTime<Utc>,
    ) -> Result<()> {
        for event in events {
            if event.kind != ApprovalEventKind::StepActivated {
                continue;
            }
            let Some(step) = event.step_index.and_then(|index| instance.steps.get_mut(index)) else {
                continue;
            };
            if !step.allow_delegate {
                continue;
            }
            for approver in step.resolved_approver_ids.clone() {
                if let Some(delegate) = self.delegations.active_delegation_for(&approver, at).await? {
                    step.active_delegations.insert(approver, delegate);
                }
            }
        }
        Ok(())
    }

    fn publish(&self, events: Vec<ApprovalEvent>) {
        if let Err(error) = self.publisher.publish_all(events) {
            warn!(error = %error, "Failed to publish approval events");
        }
    }

    fn exhausted(&self, instance_id: Uuid) -> ApprovalError {
        stale(
            instance_id,
            format!(
                "still conflicting after {} retries",
                self.max_conflict_retries
            ),
        )
    }

    fn refused(&self, instance_id: Uuid, user_id: &str, error: ApprovalError) -> ApprovalError {
        info!(
            instance_id = %instance_id,
            user_id = %user_id,
            category = ?error.category(),
            error = %error,
            "Decision refused"
        );
        error
    }
}

fn stale(instance_id: Uuid, reason: impl Into<String>) -> ApprovalError {
    ApprovalError::StaleState {
        instance_id,
        reason: reason.into(),
    }
}

/// Translate a refused transition into the error the caller acts on
fn guard_to_approval_error(instance_id: Uuid, user_id: &str, error: StateMachineError) -> ApprovalError {
    match error {
        StateMachineError::GuardFailed(GuardError::OutOfOrder {
            expected_approver_id,
            ..
        }) => ApprovalError::OutOfOrderDecision {
            instance_id,
            approver_id: user_id.to_string(),
            expected_approver_id,
        },
        StateMachineError::GuardFailed(GuardError::NotResolvedApprover { .. }) => {
            ApprovalError::UnauthorizedApprover {
                instance_id,
                approver_id: user_id.to_string(),
            }
        }
        StateMachineError::GuardFailed(guard) => stale(instance_id, guard.to_string()),
        other => other.into(),
    }
}
