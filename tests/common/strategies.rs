use approval_core::models::DocumentAttributes;
use proptest::prelude::*;
use serde_json::json;

/// Candidate flow shape: (priority, is_default, has an always-true condition)
pub type FlowShape = (i32, bool, bool);

pub fn flow_shape_strategy() -> impl Strategy<Value = FlowShape> {
    (-3i32..4, any::<bool>(), any::<bool>())
}

/// Between one and six candidate flows for the same tenant and document type
pub fn flow_shapes_strategy() -> impl Strategy<Value = Vec<FlowShape>> {
    prop::collection::vec(flow_shape_strategy(), 1..6)
}

/// Leave request attributes with a handful of realistic fields
pub fn leave_attributes_strategy() -> impl Strategy<Value = DocumentAttributes> {
    (0u32..30, prop::bool::ANY, "[a-z]{1,8}").prop_map(|(days, paid, department)| {
        let mut attributes = DocumentAttributes::new();
        attributes.insert("days".to_string(), json!(days));
        attributes.insert("paid".to_string(), json!(paid));
        attributes.insert("department".to_string(), json!(department));
        attributes
    })
}
