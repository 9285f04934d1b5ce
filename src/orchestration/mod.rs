//! # Orchestration
//!
//! Routing and execution of approval flows.
//!
//! ## Core Components
//!
//! - **ConditionEvaluator**: applies one predicate to a document's attributes
//! - **FlowSelector**: picks the single applicable flow definition
//! - **ApproverResolver**: turns approver specs into user ids and attributes
//!   delegated decisions
//! - **StepSequencer**: materializes the step instances of a new flow instance
//! - **ApprovalEngine**: submit, decide, cancel and sweep, with optimistic
//!   concurrency and post-commit event publication
//! - **TimeoutSweeper**: optional interval driver for timeout sweeps

pub mod approval_engine;
pub mod approver_resolver;
pub mod condition_evaluator;
pub mod flow_selector;
pub mod step_sequencer;
pub mod timeout_sweeper;

pub use approval_engine::{ApprovalEngine, EngineCollaborators};
pub use approver_resolver::{attribute_decision, ApproverResolver, ResolvedApprovers};
pub use condition_evaluator::{ConditionEvaluator, ConditionOutcome};
pub use flow_selector::{FlowSelection, FlowSelector, InvalidCondition};
pub use step_sequencer::StepSequencer;
pub use timeout_sweeper::{SweeperHandle, TimeoutSweeper};
