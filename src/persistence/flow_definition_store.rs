use super::{PersistenceError, PersistenceResult};
use crate::models::{DocumentType, FlowDefinition};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Tenant-scoped storage of flow definitions.
///
/// Writes that leave a definition with `is_default = true` demote every other
/// default in the same (tenant, document type) within the same atomic write.
#[async_trait]
pub trait FlowDefinitionStore: Send + Sync {
    /// Active definitions for one tenant and document type
    async fn active_for(
        &self,
        tenant_id: &str,
        document_type: DocumentType,
    ) -> PersistenceResult<Vec<FlowDefinition>>;

    /// All definitions for a tenant, optionally narrowed to one document type
    async fn list(
        &self,
        tenant_id: &str,
        document_type: Option<DocumentType>,
    ) -> PersistenceResult<Vec<FlowDefinition>>;

    async fn get(&self, id: Uuid) -> PersistenceResult<Option<FlowDefinition>>;

    async fn insert(&self, flow: FlowDefinition) -> PersistenceResult<FlowDefinition>;

    /// Overwrite a definition together with all of its steps and conditions
    async fn replace(&self, flow: FlowDefinition) -> PersistenceResult<FlowDefinition>;

    /// Remove a definition and its children. Refuses default definitions.
    async fn delete(&self, id: Uuid) -> PersistenceResult<FlowDefinition>;

    /// Promote one definition to default, demoting the previous one
    async fn set_default(&self, id: Uuid) -> PersistenceResult<FlowDefinition>;
}

#[derive(Debug, Default)]
pub struct InMemoryFlowDefinitionStore {
    flows: RwLock<HashMap<Uuid, FlowDefinition>>,
}

impl InMemoryFlowDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn demote_other_defaults(flows: &mut HashMap<Uuid, FlowDefinition>, promoted: &FlowDefinition) {
        for flow in flows.values_mut() {
            if flow.id != promoted.id
                && flow.is_default
                && flow.tenant_id == promoted.tenant_id
                && flow.document_type == promoted.document_type
            {
                flow.is_default = false;
                tracing::info!(
                    flow_id = %flow.id,
                    promoted_flow_id = %promoted.id,
                    tenant_id = %flow.tenant_id,
                    document_type = %flow.document_type,
                    "Demoted previous default flow"
                );
            }
        }
    }

    fn sorted(mut flows: Vec<FlowDefinition>) -> Vec<FlowDefinition> {
        flows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        flows
    }
}

#[async_trait]
impl FlowDefinitionStore for InMemoryFlowDefinitionStore {
    async fn active_for(
        &self,
        tenant_id: &str,
        document_type: DocumentType,
    ) -> PersistenceResult<Vec<FlowDefinition>> {
        let flows = self
            .flows
            .read()
            .values()
            .filter(|flow| {
                flow.is_active && flow.tenant_id == tenant_id && flow.document_type == document_type
            })
            .cloned()
            .collect();
        Ok(Self::sorted(flows))
    }

    async fn list(
        &self,
        tenant_id: &str,
        document_type: Option<DocumentType>,
    ) -> PersistenceResult<Vec<FlowDefinition>> {
        let flows = self
            .flows
            .read()
            .values()
            .filter(|flow| {
                flow.tenant_id == tenant_id
                    && document_type.map_or(true, |doc| flow.document_type == doc)
            })
            .cloned()
            .collect();
        Ok(Self::sorted(flows))
    }

    async fn get(&self, id: Uuid) -> PersistenceResult<Option<FlowDefinition>> {
        Ok(self.flows.read().get(&id).cloned())
    }

    async fn insert(&self, flow: FlowDefinition) -> PersistenceResult<FlowDefinition> {
        let mut flows = self.flows.write();
        if flows.contains_key(&flow.id) {
            return Err(PersistenceError::Duplicate {
                entity: "flow definition",
                id: flow.id.to_string(),
            });
        }
        if flow.is_default {
            Self::demote_other_defaults(&mut flows, &flow);
        }
        flows.insert(flow.id, flow.clone());
        Ok(flow)
    }

    async fn replace(&self, flow: FlowDefinition) -> PersistenceResult<FlowDefinition> {
        let mut flows = self.flows.write();
        if !flows.contains_key(&flow.id) {
            return Err(PersistenceError::NotFound {
                entity: "flow definition",
                id: flow.id.to_string(),
            });
        }
        if flow.is_default {
            Self::demote_other_defaults(&mut flows, &flow);
        }
        flows.insert(flow.id, flow.clone());
        Ok(flow)
    }

    async fn delete(&self, id: Uuid) -> PersistenceResult<FlowDefinition> {
        let mut flows = self.flows.write();
        match flows.get(&id) {
            None => Err(PersistenceError::NotFound {
                entity: "flow definition",
                id: id.to_string(),
            }),
            Some(flow) if flow.is_default => Err(PersistenceError::ConstraintViolation {
                constraint: format!("flow definition {id} is the default flow"),
            }),
            Some(_) => flows.remove(&id).ok_or_else(|| PersistenceError::NotFound {
                entity: "flow definition",
                id: id.to_string(),
            }),
        }
    }

    async fn set_default(&self, id: Uuid) -> PersistenceResult<FlowDefinition> {
        let mut flows = self.flows.write();
        let mut promoted = flows
            .get(&id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound {
                entity: "flow definition",
                id: id.to_string(),
            })?;
        promoted.is_default = true;
        Self::demote_other_defaults(&mut flows, &promoted);
        flows.insert(id, promoted.clone());
        Ok(promoted)
    }
}
