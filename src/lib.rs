#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Approval Core
//!
//! Approval workflow engine for multi-tenant HR documents.
//!
//! ## Overview
//!
//! Given a submitted business document (leave request, overtime, expense
//! claim, business trip, purchase request, or a scheduled change such as a
//! hire, transfer or retirement), the engine decides which people must
//! approve it, in what order and under what conditions, and then drives the
//! resulting approval flow to completion.
//!
//! ## Architecture
//!
//! ```text
//! submit ──► FlowSelector ──► StepSequencer ──► FlowInstance (pending)
//!              │                  │                   │
//!     ConditionEvaluator   ApproverResolver    InstanceStateMachine
//!                                 │                   │
//!                           OrgDirectory      DelegationRegistry
//! ```
//!
//! ## Key Features
//!
//! - **Deterministic routing**: conditions, priority and default-flow
//!   tie-breaking always pick the same definition
//! - **Frozen definitions**: instances carry a snapshot of the flow they
//!   started with
//! - **Serial and parallel steps** with quorum, fail-fast rejection and
//!   delegated decisions
//! - **Fail-closed timeouts** unless a step explicitly allows skipping
//! - **Optimistic concurrency** on a per-instance version counter
//! - **Lifecycle events** published after every committed transition
//!
//! ## Module Organization
//!
//! - [`models`] - flow definitions, instances, delegations
//! - [`state_machine`] - instance and step state machines
//! - [`orchestration`] - selection, resolution, sequencing and the engine
//! - [`registry`] - flow definition and delegation registries
//! - [`persistence`] - storage seams and in-memory stores
//! - [`services`] - organization directory seam
//! - [`events`] - lifecycle event types and publisher
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - structured error handling
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod registry;
pub mod services;
pub mod state_machine;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApprovalConfig, ConfigManager};
pub use error::{ApprovalError, ErrorCategory, Result};
pub use events::{ApprovalEvent, ApprovalEventKind, EventPublisher};
pub use orchestration::{ApprovalEngine, EngineCollaborators, TimeoutSweeper};
pub use registry::{DelegationRegistry, FlowRegistry, InMemoryDelegationRegistry};

/// Common imports for embedding the engine
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::ApprovalConfig;
    pub use crate::error::{ApprovalError, Result};
    pub use crate::events::{ApprovalEvent, ApprovalEventKind};
    pub use crate::models::{
        ApproverKind, ConditionOperator, Decision, DocumentAttributes, DocumentType,
        ExecutionMode, FlowInstance, FlowType, NewApproverSpec, NewConditionDefinition,
        NewDelegation, NewFlowDefinition, NewStepDefinition,
    };
    pub use crate::orchestration::{ApprovalEngine, EngineCollaborators};
    pub use crate::persistence::{InMemoryFlowDefinitionStore, InMemoryFlowInstanceStore};
    pub use crate::registry::{DelegationRegistry, FlowRegistry, InMemoryDelegationRegistry};
    pub use crate::services::{OrgDirectory, OrgUser, StaticOrgDirectory};
    pub use crate::state_machine::{InstanceState, StepState};
}
