//! # Flow Registry
//!
//! Administrator operations over flow definitions.
//!
//! ## Overview
//!
//! Every write is validated before it reaches the store. Updates replace a
//! definition's steps and conditions wholesale; instances already in flight
//! hold their own frozen copy and are never touched by anything here.
//!
//! ## Default Flow Invariant
//!
//! At most one definition per (tenant, document type) is the default. The
//! store demotes the previous default inside the same write that promotes a
//! new one, so a concurrent selector never observes two defaults.

use crate::clock::Clock;
use crate::error::{ApprovalError, Result};
use crate::logging::log_flow_operation;
use crate::models::{DocumentType, FlowDefinition, NewFlowDefinition};
use crate::persistence::{FlowDefinitionStore, PersistenceError};
use crate::validation::validate_flow_definition;
use std::sync::Arc;
use uuid::Uuid;

pub struct FlowRegistry {
    store: Arc<dyn FlowDefinitionStore>,
    clock: Arc<dyn Clock>,
}

impl FlowRegistry {
    pub fn new(store: Arc<dyn FlowDefinitionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, new_flow: NewFlowDefinition) -> Result<FlowDefinition> {
        validate_flow_definition(&new_flow)?;

        let flow = FlowDefinition::from_new(new_flow, self.clock.now());
        let created = self.store.insert(flow).await?;

        log_flow_operation(
            "create",
            Some(created.id),
            None,
            Some(&created.tenant_id),
            "created",
            Some(&format!(
                "{} ({}, priority {}, default {})",
                created.name, created.document_type, created.priority, created.is_default
            )),
            created.created_at,
        );
        Ok(created)
    }

    /// Replace a definition's attributes, steps and conditions.
    ///
    /// Tenant, creator and creation time are kept from the stored definition.
    pub async fn replace(&self, id: Uuid, new_flow: NewFlowDefinition) -> Result<FlowDefinition> {
        validate_flow_definition(&new_flow)?;

        let mut flow = self.get(id).await?;
        flow.name = new_flow.name;
        flow.document_type = new_flow.document_type;
        flow.flow_type = new_flow.flow_type;
        flow.use_organization_hierarchy = new_flow.use_organization_hierarchy;
        flow.organization_levels = new_flow.organization_levels;
        flow.is_active = new_flow.is_active;
        flow.is_default = new_flow.is_default;
        flow.priority = new_flow.priority;
        flow.updated_at = self.clock.now();
        flow.replace_children(new_flow.steps, new_flow.conditions);

        let replaced = self.store.replace(flow).await.map_err(|e| not_found(id, e))?;

        log_flow_operation(
            "replace",
            Some(id),
            None,
            Some(&replaced.tenant_id),
            "replaced",
            Some(&format!(
                "{} step(s) and {} condition(s) recreated",
                replaced.steps.len(),
                replaced.conditions.len()
            )),
            replaced.updated_at,
        );
        Ok(replaced)
    }

    /// Delete a non-default definition together with its steps and conditions
    pub async fn delete(&self, id: Uuid) -> Result<FlowDefinition> {
        let deleted = self.store.delete(id).await.map_err(|e| match e {
            PersistenceError::ConstraintViolation { .. } => ApprovalError::DefaultFlowDeletion(id),
            other => not_found(id, other),
        })?;

        log_flow_operation(
            "delete",
            Some(id),
            None,
            Some(&deleted.tenant_id),
            "deleted",
            None,
            self.clock.now(),
        );
        Ok(deleted)
    }

    /// Promote a definition to default, demoting the previous default atomically
    pub async fn set_default(&self, id: Uuid) -> Result<FlowDefinition> {
        let promoted = self.store.set_default(id).await.map_err(|e| not_found(id, e))?;

        log_flow_operation(
            "set_default",
            Some(id),
            None,
            Some(&promoted.tenant_id),
            "promoted",
            Some(promoted.document_type.as_str()),
            self.clock.now(),
        );
        Ok(promoted)
    }

    /// Stop a definition from being selected for new submissions
    pub async fn deactivate(&self, id: Uuid) -> Result<FlowDefinition> {
        let mut flow = self.get(id).await?;
        if !flow.is_active {
            return Ok(flow);
        }
        flow.is_active = false;
        flow.updated_at = self.clock.now();
        let flow = self.store.replace(flow).await.map_err(|e| not_found(id, e))?;

        log_flow_operation(
            "deactivate",
            Some(id),
            None,
            Some(&flow.tenant_id),
            "inactive",
            None,
            flow.updated_at,
        );
        Ok(flow)
    }

    pub async fn get(&self, id: Uuid) -> Result<FlowDefinition> {
        self.store
            .get(id)
            .await?
            .ok_or(ApprovalError::FlowDefinitionNotFound(id))
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<FlowDefinition>> {
        Ok(self.store.list(tenant_id, document_type).await?)
    }
}

fn not_found(id: Uuid, error: PersistenceError) -> ApprovalError {
    match error {
        PersistenceError::NotFound { .. } => ApprovalError::FlowDefinitionNotFound(id),
        other => other.into(),
    }
}
