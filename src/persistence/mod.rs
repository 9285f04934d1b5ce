//! # Persistence
//!
//! Storage seams for flow definitions and flow instances, plus in-memory
//! implementations for embedding and tests. A relational implementation
//! provides the same guarantees: default promotion is atomic per
//! (tenant, document type) and instance saves are compare-and-swap on
//! `version`.

pub mod flow_definition_store;
pub mod flow_instance_store;

pub use flow_definition_store::{FlowDefinitionStore, InMemoryFlowDefinitionStore};
pub use flow_instance_store::{FlowInstanceStore, InMemoryFlowInstanceStore};

use crate::error::ApprovalError;
use thiserror::Error;

/// Error type for persistence operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },

    #[error("Concurrent modification detected for {entity_id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        entity_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<PersistenceError> for ApprovalError {
    fn from(err: PersistenceError) -> Self {
        ApprovalError::Persistence(format!("{err}"))
    }
}
