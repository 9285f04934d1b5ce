use super::{PersistenceError, PersistenceResult};
use crate::models::{DocumentType, FlowInstance};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Durable storage of flow instances with per-instance optimistic concurrency
#[async_trait]
pub trait FlowInstanceStore: Send + Sync {
    /// Store a new instance at version 1
    async fn insert(&self, instance: FlowInstance) -> PersistenceResult<FlowInstance>;

    async fn get(&self, id: Uuid) -> PersistenceResult<Option<FlowInstance>>;

    /// Compare-and-swap: succeeds only if the stored version still equals
    /// `instance.version`. Returns the instance at its new version.
    async fn save(&self, instance: FlowInstance) -> PersistenceResult<FlowInstance>;

    /// Instances that have not reached a terminal state
    async fn list_pending(&self) -> PersistenceResult<Vec<FlowInstance>>;

    async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &str,
    ) -> PersistenceResult<Vec<FlowInstance>>;
}

#[derive(Debug, Default)]
pub struct InMemoryFlowInstanceStore {
    instances: DashMap<Uuid, FlowInstance>,
}

impl InMemoryFlowInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn sorted(mut instances: Vec<FlowInstance>) -> Vec<FlowInstance> {
        instances.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        instances
    }
}

#[async_trait]
impl FlowInstanceStore for InMemoryFlowInstanceStore {
    async fn insert(&self, mut instance: FlowInstance) -> PersistenceResult<FlowInstance> {
        if self.instances.contains_key(&instance.id) {
            return Err(PersistenceError::Duplicate {
                entity: "flow instance",
                id: instance.id.to_string(),
            });
        }
        instance.version = 1;
        self.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn get(&self, id: Uuid) -> PersistenceResult<Option<FlowInstance>> {
        Ok(self.instances.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, mut instance: FlowInstance) -> PersistenceResult<FlowInstance> {
        let mut stored = self
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| PersistenceError::NotFound {
                entity: "flow instance",
                id: instance.id.to_string(),
            })?;

        if stored.version != instance.version {
            return Err(PersistenceError::ConcurrentModification {
                entity_id: instance.id.to_string(),
                expected: instance.version,
                actual: stored.version,
            });
        }

        instance.version += 1;
        *stored = instance.clone();
        Ok(instance)
    }

    async fn list_pending(&self) -> PersistenceResult<Vec<FlowInstance>> {
        let pending = self
            .instances
            .iter()
            .filter(|entry| !entry.value().is_terminal())
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::sorted(pending))
    }

    async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &str,
    ) -> PersistenceResult<Vec<FlowInstance>> {
        let matching = self
            .instances
            .iter()
            .filter(|entry| {
                let instance = entry.value();
                instance.document_type == document_type && instance.document_id == document_id
            })
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::sorted(matching))
    }
}
