use super::{
    errors::{StateMachineError, StateMachineResult},
    events::StepEvent,
    guards::{FirstDecisionGuard, ResolvedApproverGuard, SerialOrderGuard, StateGuard, StepActiveGuard},
    states::StepState,
};
use crate::models::{Decision, DecisionAttribution, StepDecision, StepInstance};
use chrono::{DateTime, Utc};

/// Result of recording one decision on an active step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Counted, quorum not reached yet
    Recorded,
    /// Quorum reached, step satisfied
    Satisfied,
    /// Step rejected
    Rejected,
}

/// State machine for a single step instance
pub struct StepStateMachine<'a> {
    step: &'a mut StepInstance,
}

impl<'a> StepStateMachine<'a> {
    pub fn new(step: &'a mut StepInstance) -> Self {
        Self { step }
    }

    pub fn current_state(&self) -> StepState {
        self.step.status
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: StepState,
        event: &StepEvent,
    ) -> StateMachineResult<StepState> {
        let target = match (current_state, event) {
            (StepState::Waiting, StepEvent::Activate) => StepState::Active,

            (StepState::Active, StepEvent::Satisfy) => StepState::Satisfied,
            (StepState::Active, StepEvent::Reject) => StepState::Rejected,
            (StepState::Active, StepEvent::TimeOut) => StepState::TimedOut,

            // Timeout with skip permission, unsatisfiable skip, cancellation
            (StepState::Waiting | StepState::Active, StepEvent::Skip(_)) => StepState::Skipped,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply a transition, stamping activation, deadline and completion times
    pub fn transition(&mut self, event: StepEvent, at: DateTime<Utc>) -> StateMachineResult<StepState> {
        let from_state = self.step.status;
        let target_state = Self::determine_target_state(from_state, &event)?;

        match target_state {
            StepState::Active => {
                let deadline = match self.step.timeout_hours {
                    Some(hours) => Some(
                        at.checked_add_signed(chrono::Duration::hours(i64::from(hours)))
                            .ok_or_else(|| {
                                StateMachineError::Internal(format!(
                                    "step {} deadline overflows: {hours} hours after {at}",
                                    self.step.step_number
                                ))
                            })?,
                    ),
                    None => None,
                };
                self.step.activated_at = Some(at);
                self.step.deadline_at = deadline;
            }
            _ => {
                self.step.completed_at = Some(at);
            }
        }
        if let StepEvent::Skip(reason) = &event {
            self.step.reason = Some(reason.clone());
        }
        self.step.status = target_state;

        tracing::debug!(
            step_index = self.step.step_index,
            step_name = %self.step.name,
            from = %from_state,
            to = %target_state,
            event = event.event_type(),
            "Step transition"
        );

        Ok(target_state)
    }

    /// Record a decision and move the step to `satisfied` or `rejected` when
    /// it settles it. Guards run before anything is written.
    pub fn record_decision(
        &mut self,
        attribution: &DecisionAttribution,
        decision: Decision,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> StateMachineResult<DecisionOutcome> {
        let approver_id = attribution.approver_id.as_str();
        StepActiveGuard.check(&*self.step)?;
        ResolvedApproverGuard { approver_id }.check(&*self.step)?;
        FirstDecisionGuard { approver_id }.check(&*self.step)?;
        SerialOrderGuard { approver_id }.check(&*self.step)?;

        self.step.decisions.push(StepDecision {
            approver_id: attribution.approver_id.clone(),
            decided_by: attribution.decided_by.clone(),
            delegated_from: attribution.delegated_from.clone(),
            decision,
            comment,
            decided_at: at,
        });

        match decision {
            Decision::Reject => {
                self.transition(StepEvent::Reject, at)?;
                Ok(DecisionOutcome::Rejected)
            }
            Decision::Approve => {
                let required = usize::try_from(self.step.required_approvals).unwrap_or(usize::MAX);
                if self.step.approval_count() >= required {
                    self.transition(StepEvent::Satisfy, at)?;
                    Ok(DecisionOutcome::Satisfied)
                } else {
                    Ok(DecisionOutcome::Recorded)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionMode;
    use crate::state_machine::errors::GuardError;
    use std::collections::BTreeMap;

    fn step(mode: ExecutionMode, required: u32, approvers: &[&str]) -> StepInstance {
        StepInstance {
            step_index: 0,
            step_definition_id: None,
            step_number: 1,
            name: "review".to_string(),
            execution_mode: mode,
            required_approvals: required,
            timeout_hours: Some(4),
            allow_delegate: false,
            allow_skip: false,
            status: StepState::Waiting,
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
    fn test_transition_table() {
        assert_eq!(
            StepStateMachine::determine_target_state(StepState::Waiting, &StepEvent::Activate).unwrap(),
            StepState::Active
        );
        assert_eq!(
            StepStateMachine::determine_target_state(StepState::Active, &StepEvent::TimeOut).unwrap(),
            StepState::TimedOut
        );
        assert_eq!(
            StepStateMachine::determine_target_state(StepState::Waiting, &StepEvent::Skip("cancel".into()))
                .unwrap(),
            StepState::Skipped
        );
        assert!(StepStateMachine::determine_target_state(StepState::Satisfied, &StepEvent::Reject).is_err());
        assert!(StepStateMachine::determine_target_state(StepState::Waiting, &StepEvent::Satisfy).is_err());
    }

    #[test]
    fn test_activation_sets_deadline() {
        let mut step = step(ExecutionMode::Parallel, 1, &["a"]);
        let now = Utc::now();
        StepStateMachine::new(&mut step)
            .transition(StepEvent::Activate, now)
            .unwrap();
        assert_eq!(step.activated_at, Some(now));
        assert_eq!(step.deadline_at, Some(now + chrono::Duration::hours(4)));
    }

    #[test]
    fn test_activation_with_unrepresentable_deadline_fails_without_mutation() {
        let mut step = step(ExecutionMode::Serial, 1, &["a"]);
        step.timeout_hours = Some(u32::MAX);
        let near_end = DateTime::<Utc>::MAX_UTC - chrono::Duration::days(1);

        let err = StepStateMachine::new(&mut step)
            .transition(StepEvent::Activate, near_end)
            .unwrap_err();
        assert!(matches!(err, StateMachineError::Internal(_)));
        assert_eq!(step.status, StepState::Waiting);
        assert!(step.activated_at.is_none());
        assert!(step.deadline_at.is_none());
    }

    #[test]
    fn test_parallel_quorum() {
        let mut step = step(ExecutionMode::Parallel, 2, &["a", "b", "c"]);
        let now = Utc::now();
        let mut machine = StepStateMachine::new(&mut step);
        machine.transition(StepEvent::Activate, now).unwrap();

        let outcome = machine
            .record_decision(&DecisionAttribution::direct("c"), Decision::Approve, None, now)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Recorded);
        let outcome = machine
            .record_decision(&DecisionAttribution::direct("a"), Decision::Approve, None, now)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Satisfied);
        assert_eq!(machine.current_state(), StepState::Satisfied);
    }

    #[test]
    fn test_serial_order_guard_refuses_without_mutation() {
        let mut step = step(ExecutionMode::Serial, 2, &["a", "b"]);
        let now = Utc::now();
        let mut machine = StepStateMachine::new(&mut step);
        machine.transition(StepEvent::Activate, now).unwrap();

        let err = machine
            .record_decision(&DecisionAttribution::direct("b"), Decision::Approve, None, now)
            .unwrap_err();
        assert_eq!(
            err,
            StateMachineError::GuardFailed(GuardError::OutOfOrder {
                approver_id: "b".to_string(),
                expected_approver_id: "a".to_string(),
            })
        );
        assert!(step.decisions.is_empty());
    }

    #[test]
    fn test_reject_settles_step() {
        let mut step = step(ExecutionMode::Parallel, 2, &["a", "b"]);
        let now = Utc::now();
        let mut machine = StepStateMachine::new(&mut step);
        machine.transition(StepEvent::Activate, now).unwrap();
        let outcome = machine
            .record_decision(&DecisionAttribution::direct("b"), Decision::Reject, None, now)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Rejected);
        assert_eq!(step.status, StepState::Rejected);
        assert_eq!(step.completed_at, Some(now));
    }
}
