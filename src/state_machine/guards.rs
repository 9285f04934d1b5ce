use super::errors::{GuardError, GuardResult};
use super::states::StepState;
use crate::models::{ExecutionMode, FlowInstance, StepInstance};

/// Trait for implementing state transition guards
pub trait StateGuard<T> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Guard to refuse any mutation of a finished instance
pub struct InstancePendingGuard;

impl StateGuard<FlowInstance> for InstancePendingGuard {
    fn check(&self, instance: &FlowInstance) -> GuardResult<()> {
        if instance.is_terminal() {
            return Err(GuardError::InstanceTerminal {
                state: instance.status.to_string(),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Instance must be pending"
    }
}

/// Guard to check the step is accepting decisions
pub struct StepActiveGuard;

impl StateGuard<StepInstance> for StepActiveGuard {
    fn check(&self, step: &StepInstance) -> GuardResult<()> {
        if step.status != StepState::Active {
            return Err(GuardError::StepNotActive {
                state: step.status.to_string(),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Step must be active"
    }
}

/// Guard to check the credited approver was resolved for the step
pub struct ResolvedApproverGuard<'a> {
    pub approver_id: &'a str,
}

impl StateGuard<StepInstance> for ResolvedApproverGuard<'_> {
    fn check(&self, step: &StepInstance) -> GuardResult<()> {
        if !step.is_resolved_approver(self.approver_id) {
            return Err(GuardError::NotResolvedApprover {
                approver_id: self.approver_id.to_string(),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Approver must be resolved for the step"
    }
}

/// Guard to check each approver decides only once
pub struct FirstDecisionGuard<'a> {
    pub approver_id: &'a str,
}

impl StateGuard<StepInstance> for FirstDecisionGuard<'_> {
    fn check(&self, step: &StepInstance) -> GuardResult<()> {
        if let Some(previous) = step.decision_for(self.approver_id) {
            return Err(GuardError::AlreadyDecided {
                approver_id: self.approver_id.to_string(),
                previous: previous.decision.to_string(),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Approver must not have decided already"
    }
}

/// Guard to enforce `order` sequence within serial steps
pub struct SerialOrderGuard<'a> {
    pub approver_id: &'a str,
}

impl StateGuard<StepInstance> for SerialOrderGuard<'_> {
    fn check(&self, step: &StepInstance) -> GuardResult<()> {
        if step.execution_mode != ExecutionMode::Serial {
            return Ok(());
        }
        match step.next_serial_approver() {
            Some(expected) if expected != self.approver_id => Err(GuardError::OutOfOrder {
                approver_id: self.approver_id.to_string(),
                expected_approver_id: expected.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "Serial approvers must decide in order"
    }
}
