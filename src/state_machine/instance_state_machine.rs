use super::{
    errors::{StateMachineError, StateMachineResult},
    events::{InstanceEvent, StepEvent},
    guards::{InstancePendingGuard, StateGuard},
    states::{InstanceState, StepState},
    step_state_machine::{DecisionOutcome, StepStateMachine},
};
use crate::constants::reasons;
use crate::events::{ApprovalEvent, ApprovalEventKind};
use crate::models::{Decision, DecisionAttribution, FlowInstance};
use chrono::{DateTime, Utc};

/// State machine driving one flow instance through its steps.
///
/// Every operation mutates the borrowed instance in place and returns the
/// lifecycle events produced, in transition order. Nothing here performs I/O.
pub struct InstanceStateMachine<'a> {
    instance: &'a mut FlowInstance,
}

impl<'a> InstanceStateMachine<'a> {
    pub fn new(instance: &'a mut FlowInstance) -> Self {
        Self { instance }
    }

    pub fn current_state(&self) -> InstanceState {
        self.instance.status
    }

    pub fn instance(&self) -> &FlowInstance {
        self.instance
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: InstanceState,
        event: &InstanceEvent,
    ) -> StateMachineResult<InstanceState> {
        let target = match (current_state, event) {
            (InstanceState::Pending, InstanceEvent::Approve) => InstanceState::Approved,
            (InstanceState::Pending, InstanceEvent::Reject(_)) => InstanceState::Rejected,
            (InstanceState::Pending, InstanceEvent::Cancel) => InstanceState::Cancelled,
            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };
        Ok(target)
    }

    /// Activate the first step
    pub fn start(&mut self, at: DateTime<Utc>) -> StateMachineResult<Vec<ApprovalEvent>> {
        InstancePendingGuard.check(&*self.instance)?;
        if self.instance.steps.is_empty() {
            return Err(StateMachineError::Internal(format!(
                "Instance {} has no steps to activate",
                self.instance.id
            )));
        }
        if self
            .instance
            .steps
            .iter()
            .any(|step| step.status != StepState::Waiting)
        {
            return Err(StateMachineError::InvalidTransition {
                from: "started".to_string(),
                event: "start".to_string(),
            });
        }

        let mut events = Vec::new();
        self.activate_from(0, at, &mut events)?;
        Ok(events)
    }

    /// Record a decision on the current step and advance or terminate the
    /// instance when the step settles
    pub fn record_decision(
        &mut self,
        attribution: &DecisionAttribution,
        decision: Decision,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> StateMachineResult<Vec<ApprovalEvent>> {
        InstancePendingGuard.check(&*self.instance)?;
        let index = self.instance.current_step_index;
        let step = self.instance.steps.get_mut(index).ok_or_else(|| {
            StateMachineError::Internal(format!("Current step {index} does not exist"))
        })?;

        let outcome = StepStateMachine::new(step).record_decision(attribution, decision, comment, at)?;

        let mut events = Vec::new();
        match outcome {
            DecisionOutcome::Recorded => {}
            DecisionOutcome::Satisfied => {
                events.push(ApprovalEvent::for_step(
                    self.instance,
                    ApprovalEventKind::StepSatisfied,
                    index,
                    at,
                ));
                self.activate_from(index + 1, at, &mut events)?;
            }
            DecisionOutcome::Rejected => {
                events.push(
                    ApprovalEvent::for_step(self.instance, ApprovalEventKind::StepRejected, index, at)
                        .with_reason(reasons::APPROVER_REJECTED),
                );
                self.transition(
                    InstanceEvent::Reject(reasons::APPROVER_REJECTED.to_string()),
                    at,
                    &mut events,
                )?;
            }
        }
        Ok(events)
    }

    /// Escalate the current step if its deadline passed before `as_of`.
    /// Returns no events when there is nothing to escalate, so repeated
    /// sweeps are harmless.
    pub fn apply_timeout(&mut self, as_of: DateTime<Utc>) -> StateMachineResult<Vec<ApprovalEvent>> {
        let mut events = Vec::new();
        if self.instance.is_terminal() {
            return Ok(events);
        }
        let Some(step) = self.instance.active_step() else {
            return Ok(events);
        };
        if !step.is_overdue(as_of) {
            return Ok(events);
        }

        let index = self.instance.current_step_index;
        if step.allow_skip {
            self.step_transition(
                index,
                StepEvent::Skip(reasons::STEP_TIMEOUT_SKIPPED.to_string()),
                as_of,
                &mut events,
            )?;
            self.activate_from(index + 1, as_of, &mut events)?;
        } else {
            self.step_transition(index, StepEvent::TimeOut, as_of, &mut events)?;
            self.transition(
                InstanceEvent::Reject(reasons::STEP_TIMEOUT.to_string()),
                as_of,
                &mut events,
            )?;
        }
        Ok(events)
    }

    /// Skip every open step and cancel the instance. Cancelling a finished
    /// instance changes nothing.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> StateMachineResult<Vec<ApprovalEvent>> {
        let mut events = Vec::new();
        if self.instance.is_terminal() {
            return Ok(events);
        }

        let open_steps: Vec<usize> = self
            .instance
            .steps
            .iter()
            .filter(|step| !step.status.is_terminal())
            .map(|step| step.step_index)
            .collect();
        for index in open_steps {
            self.step_transition(
                index,
                StepEvent::Skip(reasons::CANCELLED_BY_REQUESTER.to_string()),
                at,
                &mut events,
            )?;
        }
        self.transition(InstanceEvent::Cancel, at, &mut events)?;
        Ok(events)
    }

    /// Activate the step at `index`, passing over unsatisfiable steps that
    /// may be skipped. Running off the end approves the instance.
    fn activate_from(
        &mut self,
        mut index: usize,
        at: DateTime<Utc>,
        events: &mut Vec<ApprovalEvent>,
    ) -> StateMachineResult<()> {
        loop {
            if index >= self.instance.steps.len() {
                self.instance.current_step_index = self.instance.steps.len().saturating_sub(1);
                self.transition(InstanceEvent::Approve, at, events)?;
                return Ok(());
            }

            self.instance.current_step_index = index;
            let step = &self.instance.steps[index];
            if !step.unsatisfiable {
                self.step_transition(index, StepEvent::Activate, at, events)?;
                return Ok(());
            }

            if step.allow_skip {
                self.step_transition(
                    index,
                    StepEvent::Skip(reasons::UNSATISFIABLE_SKIPPED.to_string()),
                    at,
                    events,
                )?;
                index += 1;
                continue;
            }

            self.step_transition(index, StepEvent::Activate, at, events)?;
            self.step_transition(index, StepEvent::TimeOut, at, events)?;
            self.transition(
                InstanceEvent::Reject(reasons::UNSATISFIABLE_STEP.to_string()),
                at,
                events,
            )?;
            return Ok(());
        }
    }

    fn step_transition(
        &mut self,
        index: usize,
        event: StepEvent,
        at: DateTime<Utc>,
        events: &mut Vec<ApprovalEvent>,
    ) -> StateMachineResult<StepState> {
        let reason = match &event {
            StepEvent::Skip(reason) => Some(reason.clone()),
            _ => None,
        };
        let kind = match event {
            StepEvent::Activate => ApprovalEventKind::StepActivated,
            StepEvent::Satisfy => ApprovalEventKind::StepSatisfied,
            StepEvent::Reject => ApprovalEventKind::StepRejected,
            StepEvent::Skip(_) => ApprovalEventKind::StepSkipped,
            StepEvent::TimeOut => ApprovalEventKind::StepTimedOut,
        };

        let step = self.instance.steps.get_mut(index).ok_or_else(|| {
            StateMachineError::Internal(format!("Step {index} does not exist"))
        })?;
        let target = StepStateMachine::new(step).transition(event, at)?;

        let mut approval_event = ApprovalEvent::for_step(self.instance, kind, index, at);
        approval_event.reason = reason;
        events.push(approval_event);
        Ok(target)
    }

    fn transition(
        &mut self,
        event: InstanceEvent,
        at: DateTime<Utc>,
        events: &mut Vec<ApprovalEvent>,
    ) -> StateMachineResult<InstanceState> {
        let from_state = self.instance.status;
        let target_state = Self::determine_target_state(from_state, &event)?;

        self.instance.status = target_state;
        self.instance.completed_at = Some(at);
        self.instance.reason = match &event {
            InstanceEvent::Reject(reason) => Some(reason.clone()),
            InstanceEvent::Cancel => Some(reasons::CANCELLED_BY_REQUESTER.to_string()),
            InstanceEvent::Approve => None,
        };

        let kind = match target_state {
            InstanceState::Approved => ApprovalEventKind::InstanceApproved,
            InstanceState::Rejected => ApprovalEventKind::InstanceRejected,
            _ => ApprovalEventKind::InstanceCancelled,
        };
        let mut approval_event = ApprovalEvent::for_instance(self.instance, kind, at);
        approval_event.reason = self.instance.reason.clone();
        events.push(approval_event);

        tracing::info!(
            instance_id = %self.instance.id,
            document_type = %self.instance.document_type,
            document_id = %self.instance.document_id,
            from = %from_state,
            to = %target_state,
            event = event.event_type(),
            "Flow instance transition"
        );

        Ok(target_state)
    }
}
