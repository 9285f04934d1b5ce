//! # Registries
//!
//! Administrator-facing registries the engine reads from.
//!
//! ## Available Registries
//!
//! - **FlowRegistry**: validated create/replace/delete/default management of
//!   flow definitions on top of a [`FlowDefinitionStore`](crate::persistence::FlowDefinitionStore)
//! - **DelegationRegistry**: time-bounded approval delegations, conflict
//!   checked at write time
//!
//! ```text
//! Registries
//! ├── FlowRegistry        (flow definition lifecycle)
//! └── DelegationRegistry  (who acts for whom, and when)
//! ```

pub mod delegation_registry;
pub mod flow_registry;

pub use delegation_registry::{DelegationRegistry, InMemoryDelegationRegistry};
pub use flow_registry::FlowRegistry;
