mod common;

use approval_core::models::{
    ConditionDefinition, ConditionOperator, DocumentType, FlowDefinition, NewConditionDefinition,
};
use approval_core::orchestration::{ConditionEvaluator, FlowSelector};
use approval_core::persistence::{FlowDefinitionStore, InMemoryFlowDefinitionStore};
use chrono::Duration;
use common::strategies::*;
use common::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Build stored definitions from shapes; `applies == false` adds a
/// condition no leave request can meet
fn definitions(shapes: &[FlowShape]) -> Vec<FlowDefinition> {
    shapes
        .iter()
        .enumerate()
        .map(|(index, (priority, is_default, applies))| {
            let mut builder = FlowBuilder::custom(&format!("flow {index}"), DocumentType::LeaveRequest)
                .priority(*priority)
                .step(serial_step(1, 1, &["lead"]));
            if *is_default {
                builder = builder.default_flow();
            }
            if !applies {
                builder = builder.condition("days", ConditionOperator::Lt, json!(0));
            }
            // Minute-level spacing keeps created_at distinct for some shapes and equal for others
            let created_at = start_time() + Duration::minutes((index % 3) as i64);
            FlowDefinition::from_new(builder.build(), created_at)
        })
        .collect()
}

fn select(
    store: Arc<InMemoryFlowDefinitionStore>,
    attributes: &approval_core::models::DocumentAttributes,
) -> Option<Uuid> {
    tokio_test::block_on(async {
        FlowSelector::new(store)
            .select(TENANT, DocumentType::LeaveRequest, attributes)
            .await
            .ok()
            .map(|flow| flow.id)
    })
}

fn condition(operator: ConditionOperator, value: i64) -> ConditionDefinition {
    let new = NewConditionDefinition {
        field: "days".to_string(),
        operator,
        value: json!(value),
        description: None,
    };
    ConditionDefinition {
        id: Uuid::new_v4(),
        flow_id: Uuid::nil(),
        field: new.field,
        operator: new.operator,
        value: new.value,
        description: new.description,
    }
}

proptest! {
    /// Property: at most one default survives any sequence of inserts
    #[test]
    fn at_most_one_default_per_document_type(shapes in flow_shapes_strategy()) {
        let store = InMemoryFlowDefinitionStore::new();
        let stored = tokio_test::block_on(async {
            for flow in definitions(&shapes) {
                store.insert(flow).await.unwrap();
            }
            store.list(TENANT, Some(DocumentType::LeaveRequest)).await.unwrap()
        });
        prop_assert!(stored.iter().filter(|flow| flow.is_default).count() <= 1);
    }

    /// Property: selection depends on the definitions, not on storage order
    #[test]
    fn selection_ignores_insertion_order(
        shapes in flow_shapes_strategy(),
        attributes in leave_attributes_strategy(),
    ) {
        let forward = Arc::new(InMemoryFlowDefinitionStore::new());
        let stored = tokio_test::block_on(async {
            for flow in definitions(&shapes) {
                forward.insert(flow).await.unwrap();
            }
            forward.list(TENANT, None).await.unwrap()
        });

        let reverse = Arc::new(InMemoryFlowDefinitionStore::new());
        tokio_test::block_on(async {
            // Non-defaults first so the surviving default is not demoted
            let (defaults, others): (Vec<_>, Vec<_>) =
                stored.iter().cloned().rev().partition(|flow| flow.is_default);
            for flow in others.into_iter().chain(defaults) {
                reverse.insert(flow).await.unwrap();
            }
        });

        let first = select(forward.clone(), &attributes);
        prop_assert_eq!(first, select(forward, &attributes));
        prop_assert_eq!(first, select(reverse, &attributes));
    }

    /// Property: the selected flow applies, or is the default fallback, and
    /// no applicable flow outranks it
    #[test]
    fn selected_flow_has_top_priority(
        shapes in flow_shapes_strategy(),
        attributes in leave_attributes_strategy(),
    ) {
        let store = Arc::new(InMemoryFlowDefinitionStore::new());
        let stored = tokio_test::block_on(async {
            for flow in definitions(&shapes) {
                store.insert(flow).await.unwrap();
            }
            store.list(TENANT, None).await.unwrap()
        });
        let applicable: Vec<&FlowDefinition> =
            stored.iter().filter(|flow| flow.conditions.is_empty()).collect();

        match select(store, &attributes) {
            Some(id) => {
                let chosen = stored.iter().find(|flow| flow.id == id).unwrap();
                if applicable.is_empty() {
                    prop_assert!(chosen.is_default);
                } else {
                    let best = applicable.iter().map(|flow| flow.priority).max().unwrap();
                    prop_assert_eq!(chosen.priority, best);
                }
            }
            None => {
                prop_assert!(applicable.is_empty());
                prop_assert!(stored.iter().all(|flow| !flow.is_default));
            }
        }
    }

    /// Property: gte and lt split every integer value
    #[test]
    fn gte_and_lt_are_complementary(threshold in -1000i64..1000, days in -1000i64..1000) {
        let evaluator = ConditionEvaluator::new();
        let attributes = attributes(json!({"days": days}));
        let gte = evaluator.evaluate(&condition(ConditionOperator::Gte, threshold), &attributes);
        let lt = evaluator.evaluate(&condition(ConditionOperator::Lt, threshold), &attributes);
        prop_assert_ne!(gte, lt);
        prop_assert_eq!(gte, days >= threshold);
    }
}
