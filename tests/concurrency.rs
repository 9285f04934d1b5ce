mod common;

use approval_core::clock::{Clock, ManualClock};
use approval_core::config::ApprovalConfig;
use approval_core::models::{Decision, DocumentType, FlowDefinition, FlowInstance};
use approval_core::orchestration::{ApprovalEngine, EngineCollaborators};
use approval_core::persistence::{
    FlowDefinitionStore, FlowInstanceStore, InMemoryFlowDefinitionStore, InMemoryFlowInstanceStore,
    PersistenceError, PersistenceResult,
};
use approval_core::registry::InMemoryDelegationRegistry;
use approval_core::state_machine::InstanceState;
use approval_core::ApprovalError;
use async_trait::async_trait;
use common::*;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_are_all_counted() {
    let harness = TestHarness::new();
    harness
        .registry
        .create(
            FlowBuilder::custom("board", DocumentType::PurchaseRequest)
                .step(parallel_step(1, 3, &["hr-1", "hr-2", "hr-3"]))
                .build(),
        )
        .await
        .unwrap();
    let instance = harness
        .engine
        .submit(TENANT, DocumentType::PurchaseRequest, "po-1", "emp", attributes(json!({})))
        .await
        .unwrap();

    let handles: Vec<_> = ["hr-1", "hr-2", "hr-3"]
        .into_iter()
        .map(|approver| {
            let engine = harness.engine.clone();
            let instance_id = instance.id;
            tokio::spawn(async move {
                engine
                    .decide(instance_id, approver, Decision::Approve, None)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let instance = harness.engine.instance(instance.id).await.unwrap();
    assert_eq!(instance.status, InstanceState::Approved);
    assert_eq!(instance.steps[0].approval_count(), 3);
    // One insert plus one save per approval
    assert_eq!(instance.version, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_approve_reject_race_has_one_winner() {
    let harness = TestHarness::new();
    harness
        .registry
        .create(
            FlowBuilder::custom("trip", DocumentType::BusinessTrip)
                .step(parallel_step(1, 1, &["hr-1", "hr-2"]))
                .build(),
        )
        .await
        .unwrap();

    for round in 0..10 {
        let instance = harness
            .engine
            .submit(
                TENANT,
                DocumentType::BusinessTrip,
                &format!("trip-{round}"),
                "emp",
                attributes(json!({})),
            )
            .await
            .unwrap();

        let instance_id = instance.id;
        let approve = {
            let engine = harness.engine.clone();
            tokio::spawn(async move { engine.decide(instance_id, "hr-1", Decision::Approve, None).await })
        };
        let reject = {
            let engine = harness.engine.clone();
            tokio::spawn(async move { engine.decide(instance_id, "hr-2", Decision::Reject, None).await })
        };
        let approve = approve.await.unwrap();
        let reject = reject.await.unwrap();

        let stored = harness.engine.instance(instance_id).await.unwrap();
        match (&approve, &reject) {
            (Ok(_), Err(ApprovalError::StaleState { .. })) => {
                assert_eq!(stored.status, InstanceState::Approved);
            }
            (Err(ApprovalError::StaleState { .. }), Ok(_)) => {
                assert_eq!(stored.status, InstanceState::Rejected);
            }
            other => panic!("expected exactly one winner, got {other:?}"),
        }
        assert_eq!(stored.steps[0].decisions.len(), 1);
    }
}

#[tokio::test]
async fn test_store_refuses_stale_version() {
    let harness = TestHarness::new();
    harness
        .registry
        .create(
            FlowBuilder::custom("leave", DocumentType::LeaveRequest)
                .step(serial_step(1, 1, &["lead"]))
                .build(),
        )
        .await
        .unwrap();
    let instance = harness
        .engine
        .submit(TENANT, DocumentType::LeaveRequest, "leave-1", "emp", attributes(json!({})))
        .await
        .unwrap();

    let saved = harness.instances.save(instance.clone()).await.unwrap();
    assert_eq!(saved.version, instance.version + 1);

    let stale = harness.instances.save(instance).await;
    assert!(matches!(
        stale,
        Err(PersistenceError::ConcurrentModification { expected: 1, actual: 2, .. })
    ));
}

/// Instance store whose saves always lose the race
#[derive(Default)]
struct AlwaysConflicting {
    inner: InMemoryFlowInstanceStore,
}

#[async_trait]
impl FlowInstanceStore for AlwaysConflicting {
    async fn insert(&self, instance: FlowInstance) -> PersistenceResult<FlowInstance> {
        self.inner.insert(instance).await
    }

    async fn get(&self, id: Uuid) -> PersistenceResult<Option<FlowInstance>> {
        self.inner.get(id).await
    }

    async fn save(&self, instance: FlowInstance) -> PersistenceResult<FlowInstance> {
        Err(PersistenceError::ConcurrentModification {
            entity_id: instance.id.to_string(),
            expected: instance.version,
            actual: instance.version + 1,
        })
    }

    async fn list_pending(&self) -> PersistenceResult<Vec<FlowInstance>> {
        self.inner.list_pending().await
    }

    async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &str,
    ) -> PersistenceResult<Vec<FlowInstance>> {
        self.inner.find_by_document(document_type, document_id).await
    }
}

#[tokio::test]
async fn test_exhausted_retries_surface_stale_state() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start_time()));
    let definitions = Arc::new(InMemoryFlowDefinitionStore::new());
    let new_flow = FlowBuilder::custom("leave", DocumentType::LeaveRequest)
        .step(serial_step(1, 1, &["lead"]))
        .build();
    definitions
        .insert(FlowDefinition::from_new(new_flow, clock.now()))
        .await
        .unwrap();

    let mut config = ApprovalConfig::default();
    config.engine.max_conflict_retries = 2;
    let engine = ApprovalEngine::new(
        &config,
        EngineCollaborators {
            clock: clock.clone(),
            directory: Arc::new(organization()),
            definitions,
            instances: Arc::new(AlwaysConflicting::default()),
            delegations: Arc::new(InMemoryDelegationRegistry::new(clock)),
        },
    );

    let instance = engine
        .submit(TENANT, DocumentType::LeaveRequest, "leave-2", "emp", attributes(json!({})))
        .await
        .unwrap();
    let result = engine.decide(instance.id, "lead", Decision::Approve, None).await;
    assert!(matches!(result, Err(ApprovalError::StaleState { .. })));

    let unchanged = engine.instance(instance.id).await.unwrap();
    assert_eq!(unchanged.status, InstanceState::Pending);
    assert!(unchanged.steps[0].decisions.is_empty());
}
