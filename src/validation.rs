//! Input validation for flow definitions and document attribute snapshots
//!
//! Definitions are validated before every registry write so the selector and
//! sequencer only ever see well-formed templates. Attribute snapshots get the
//! same size and depth limits any JSON payload stored alongside an instance gets.

use crate::constants::system::MAX_STEP_TIMEOUT_HOURS;
use crate::error::{ApprovalError, Result};
use crate::models::{
    ApproverKind, DocumentAttributes, FlowType, NewApproverSpec, NewConditionDefinition,
    NewFlowDefinition, NewStepDefinition,
};
use serde_json::Value;
use std::collections::HashSet;

/// Maximum allowed size for an attribute snapshot (1MB)
const MAX_JSON_SIZE_BYTES: usize = 1024 * 1024;

/// Maximum nesting depth for JSON objects/arrays
const MAX_JSON_DEPTH: usize = 10;

/// Maximum number of keys in a JSON object
const MAX_JSON_KEYS: usize = 1000;

/// Maximum string length for JSON string values
const MAX_JSON_STRING_LENGTH: usize = 10000;

/// Validates a document attribute snapshot for size and structure
pub fn validate_document_attributes(attributes: &DocumentAttributes) -> Result<()> {
    let serialized = serde_json::to_string(attributes)
        .map_err(|e| ApprovalError::InvalidDefinition(format!("Invalid attribute snapshot: {e}")))?;

    if serialized.len() > MAX_JSON_SIZE_BYTES {
        return Err(ApprovalError::InvalidDefinition(format!(
            "Attribute snapshot too large: {} bytes (max: {})",
            serialized.len(),
            MAX_JSON_SIZE_BYTES
        )));
    }

    for (key, value) in attributes {
        validate_key(key)?;
        validate_json_depth(value, 1)?;
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<()> {
    if key.len() > MAX_JSON_STRING_LENGTH {
        return Err(ApprovalError::InvalidDefinition(format!(
            "Attribute key too long: {} chars (max: {})",
            key.len(),
            MAX_JSON_STRING_LENGTH
        )));
    }
    Ok(())
}

fn validate_json_depth(value: &Value, current_depth: usize) -> Result<()> {
    if current_depth > MAX_JSON_DEPTH {
        return Err(ApprovalError::InvalidDefinition(format!(
            "Attribute nesting too deep: {current_depth} (max: {MAX_JSON_DEPTH})"
        )));
    }

    match value {
        Value::Object(map) => {
            if map.len() > MAX_JSON_KEYS {
                return Err(ApprovalError::InvalidDefinition(format!(
                    "Too many attribute keys: {} (max: {})",
                    map.len(),
                    MAX_JSON_KEYS
                )));
            }
            for (key, val) in map {
                validate_key(key)?;
                validate_json_depth(val, current_depth + 1)?;
            }
        }
        Value::Array(arr) => {
            if arr.len() > MAX_JSON_KEYS {
                return Err(ApprovalError::InvalidDefinition(format!(
                    "Attribute array too large: {} items (max: {})",
                    arr.len(),
                    MAX_JSON_KEYS
                )));
            }
            for item in arr {
                validate_json_depth(item, current_depth + 1)?;
            }
        }
        Value::String(s) => {
            if s.len() > MAX_JSON_STRING_LENGTH {
                return Err(ApprovalError::InvalidDefinition(format!(
                    "Attribute string too long: {} chars (max: {})",
                    s.len(),
                    MAX_JSON_STRING_LENGTH
                )));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Validates administrator input for a flow definition
pub fn validate_flow_definition(flow: &NewFlowDefinition) -> Result<()> {
    if flow.name.trim().is_empty() {
        return Err(invalid("flow name must not be empty"));
    }
    if flow.tenant_id.trim().is_empty() {
        return Err(invalid("tenant id must not be empty"));
    }
    if flow.organization_levels == Some(0) {
        return Err(invalid("organization_levels must be at least 1"));
    }
    if flow.flow_type == FlowType::Custom && flow.steps.is_empty() {
        return Err(invalid("custom flows need at least one step"));
    }

    let mut numbers: Vec<u32> = flow.steps.iter().map(|step| step.step_number).collect();
    numbers.sort_unstable();
    let mut seen = HashSet::new();
    for number in &numbers {
        if !seen.insert(*number) {
            return Err(invalid(format!("step number {number} is used more than once")));
        }
    }
    for (position, number) in numbers.iter().enumerate() {
        if *number as usize != position + 1 {
            return Err(invalid(format!(
                "step numbers must run 1..={} without gaps, found {number}",
                numbers.len()
            )));
        }
    }

    for step in &flow.steps {
        validate_step(step)?;
    }
    for condition in &flow.conditions {
        validate_condition(condition)?;
    }
    Ok(())
}

fn validate_step(step: &NewStepDefinition) -> Result<()> {
    if step.name.trim().is_empty() {
        return Err(invalid(format!("step {} needs a name", step.step_number)));
    }
    if step.required_approvals == 0 {
        return Err(invalid(format!(
            "step {} must require at least one approval",
            step.step_number
        )));
    }
    if step.approvers.is_empty() {
        return Err(invalid(format!(
            "step {} has no approvers",
            step.step_number
        )));
    }
    if step.timeout_hours == Some(0) {
        return Err(invalid(format!(
            "step {} timeout must be at least one hour",
            step.step_number
        )));
    }
    if let Some(hours) = step.timeout_hours.filter(|hours| *hours > MAX_STEP_TIMEOUT_HOURS) {
        return Err(invalid(format!(
            "step {} timeout of {hours} hours exceeds the maximum of {MAX_STEP_TIMEOUT_HOURS}",
            step.step_number
        )));
    }
    for approver in &step.approvers {
        validate_approver(step.step_number, approver)?;
    }
    Ok(())
}

fn validate_approver(step_number: u32, approver: &NewApproverSpec) -> Result<()> {
    let problem = match &approver.kind {
        ApproverKind::User { approver_id } if approver_id.trim().is_empty() => {
            Some("user approver needs approver_id")
        }
        ApproverKind::Role { approver_role } if approver_role.trim().is_empty() => {
            Some("role approver needs approver_role")
        }
        ApproverKind::PositionLevel { position_level } if *position_level == 0 => {
            Some("position_level approver needs a level of at least 1")
        }
        ApproverKind::OrgHierarchy {
            position_level: Some(0),
        } => Some("org_hierarchy level must be at least 1"),
        _ => None,
    };
    match problem {
        Some(problem) => Err(invalid(format!("step {step_number}: {problem}"))),
        None => Ok(()),
    }
}

fn validate_condition(condition: &NewConditionDefinition) -> Result<()> {
    if condition.field.trim().is_empty() || condition.field.split('.').any(str::is_empty) {
        return Err(invalid(format!(
            "condition field '{}' is not a valid path",
            condition.field
        )));
    }
    if condition.operator.is_ordering() && as_number(&condition.value).is_none() {
        return Err(invalid(format!(
            "condition on '{}' uses {} with non-numeric value {}",
            condition.field, condition.operator, condition.value
        )));
    }
    Ok(())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn invalid(message: impl Into<String>) -> ApprovalError {
    ApprovalError::InvalidDefinition(message.into())
}
