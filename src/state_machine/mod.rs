// State machines for approval flow instances and their steps
//
// Transitions are pure in-memory operations on a FlowInstance. Persistence,
// delegation lookups and event publication happen around them in the
// orchestration layer, so a transition that loses an optimistic concurrency
// race can be recomputed without side effects.

pub mod errors;
pub mod events;
pub mod guards;
pub mod instance_state_machine;
pub mod states;
pub mod step_state_machine;

// Re-export main types for convenient access
pub use errors::{GuardError, StateMachineError};
pub use events::{InstanceEvent, StepEvent};
pub use instance_state_machine::InstanceStateMachine;
pub use states::{InstanceState, StepState};
pub use step_state_machine::{DecisionOutcome, StepStateMachine};

pub use guards::StateGuard;
