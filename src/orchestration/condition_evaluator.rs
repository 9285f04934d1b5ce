//! # Condition Evaluator
//!
//! Evaluates one (field, operator, value) predicate against a document's
//! attribute snapshot.
//!
//! Comparison is numeric when both sides parse as numbers. Otherwise only
//! `eq` and `ne` apply, as string comparisons; an ordering operator on a
//! non-numeric operand is flagged [`ConditionOutcome::Invalid`] and counts as
//! not matching. Nothing here returns an error: data problems degrade to
//! "does not match".

use crate::models::{ConditionDefinition, ConditionOperator, DocumentAttributes};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::warn;

/// Detailed result of checking one condition
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOutcome {
    Matched,
    NotMatched,
    /// The field path does not resolve to a value
    MissingField,
    /// The condition cannot be applied to these operands
    Invalid(String),
}

impl ConditionOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, condition: &ConditionDefinition, attributes: &DocumentAttributes) -> bool {
        self.check(condition, attributes).is_match()
    }

    /// All conditions must hold; an empty list always holds
    pub fn evaluate_all(
        &self,
        conditions: &[ConditionDefinition],
        attributes: &DocumentAttributes,
    ) -> bool {
        conditions
            .iter()
            .all(|condition| self.evaluate(condition, attributes))
    }

    pub fn check(&self, condition: &ConditionDefinition, attributes: &DocumentAttributes) -> ConditionOutcome {
        let Some(actual) = lookup(attributes, &condition.field) else {
            return ConditionOutcome::MissingField;
        };

        let outcome = compare(actual, condition.operator, &condition.value);
        if let ConditionOutcome::Invalid(reason) = &outcome {
            warn!(
                condition_id = %condition.id,
                flow_id = %condition.flow_id,
                field = %condition.field,
                operator = %condition.operator,
                reason = %reason,
                "Condition flagged invalid"
            );
        }
        outcome
    }
}

/// Resolve a dotted path such as `trip.days` through nested objects.
/// `null` counts as absent.
pub fn lookup<'a>(attributes: &'a DocumentAttributes, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = attributes.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

fn compare(actual: &Value, operator: ConditionOperator, expected: &Value) -> ConditionOutcome {
    if let (Some(left), Some(right)) = (as_number(actual), as_number(expected)) {
        let Some(ordering) = left.partial_cmp(&right) else {
            return ConditionOutcome::Invalid("NaN is not comparable".to_string());
        };
        let matched = match operator {
            ConditionOperator::Eq => ordering == Ordering::Equal,
            ConditionOperator::Ne => ordering != Ordering::Equal,
            ConditionOperator::Gt => ordering == Ordering::Greater,
            ConditionOperator::Gte => ordering != Ordering::Less,
            ConditionOperator::Lt => ordering == Ordering::Less,
            ConditionOperator::Lte => ordering != Ordering::Greater,
        };
        return to_outcome(matched);
    }

    if operator.is_ordering() {
        return ConditionOutcome::Invalid(format!(
            "{} needs numeric operands, got {actual} and {expected}",
            operator.symbol()
        ));
    }

    let (Some(left), Some(right)) = (as_text(actual), as_text(expected)) else {
        return ConditionOutcome::Invalid("only scalar values can be compared".to_string());
    };
    match operator {
        ConditionOperator::Eq => to_outcome(left == right),
        _ => to_outcome(left != right),
    }
}

fn to_outcome(matched: bool) -> ConditionOutcome {
    if matched {
        ConditionOutcome::Matched
    } else {
        ConditionOutcome::NotMatched
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
