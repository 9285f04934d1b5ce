//! # Flow Selector
//!
//! Picks exactly one flow definition for a submitted document.
//!
//! ## Algorithm
//!
//! 1. Load the active definitions for (tenant, document type)
//! 2. Keep those whose conditions all hold against the attribute snapshot
//! 3. Order survivors by priority (highest first), then default before
//!    non-default, then most recent `created_at`, then id
//! 4. With no survivors fall back to the active default definition; with no
//!    default either, fail with `NoApplicableFlow`
//!
//! The ordering is total, so repeated selections over the same definitions
//! and attributes always return the same flow.

use super::condition_evaluator::{ConditionEvaluator, ConditionOutcome};
use crate::error::{ApprovalError, Result};
use crate::models::{DocumentAttributes, DocumentType, FlowDefinition};
use crate::persistence::FlowDefinitionStore;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A condition that could not be applied to the submitted attributes
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCondition {
    pub flow_id: Uuid,
    pub condition_id: Uuid,
    pub field: String,
    pub reason: String,
}

/// Outcome of a selection with the details behind it
#[derive(Debug, Clone)]
pub struct FlowSelection {
    pub flow: FlowDefinition,
    /// No candidate's conditions matched; the default flow was used
    pub used_default_fallback: bool,
    /// Active definitions considered
    pub candidates: usize,
    /// Definitions whose conditions all held
    pub matched: usize,
    pub invalid_conditions: Vec<InvalidCondition>,
}

pub struct FlowSelector {
    store: Arc<dyn FlowDefinitionStore>,
    evaluator: ConditionEvaluator,
}

impl FlowSelector {
    pub fn new(store: Arc<dyn FlowDefinitionStore>) -> Self {
        Self {
            store,
            evaluator: ConditionEvaluator::new(),
        }
    }

    pub async fn select(
        &self,
        tenant_id: &str,
        document_type: DocumentType,
        attributes: &DocumentAttributes,
    ) -> Result<FlowDefinition> {
        Ok(self
            .select_with_diagnostics(tenant_id, document_type, attributes)
            .await?
            .flow)
    }

    pub async fn select_with_diagnostics(
        &self,
        tenant_id: &str,
        document_type: DocumentType,
        attributes: &DocumentAttributes,
    ) -> Result<FlowSelection> {
        let candidates = self.store.active_for(tenant_id, document_type).await?;
        let candidate_count = candidates.len();

        let mut invalid_conditions = Vec::new();
        let mut default_flow = None;
        let mut survivors = Vec::new();
        for flow in candidates {
            if self.conditions_hold(&flow, attributes, &mut invalid_conditions) {
                survivors.push(flow);
            } else if flow.is_default {
                default_flow = Some(flow);
            }
        }
        let matched = survivors.len();

        survivors.sort_by(precedence);
        let (flow, used_default_fallback) = match survivors.into_iter().next() {
            Some(flow) => (flow, false),
            None => match default_flow {
                Some(flow) => (flow, true),
                None => {
                    warn!(
                        tenant_id = %tenant_id,
                        document_type = %document_type,
                        candidates = candidate_count,
                        "No applicable approval flow"
                    );
                    return Err(ApprovalError::NoApplicableFlow {
                        tenant_id: tenant_id.to_string(),
                        document_type,
                    });
                }
            },
        };

        info!(
            tenant_id = %tenant_id,
            document_type = %document_type,
            flow_id = %flow.id,
            flow_name = %flow.name,
            priority = flow.priority,
            candidates = candidate_count,
            matched = matched,
            default_fallback = used_default_fallback,
            "Selected approval flow"
        );

        Ok(FlowSelection {
            flow,
            used_default_fallback,
            candidates: candidate_count,
            matched,
            invalid_conditions,
        })
    }

    fn conditions_hold(
        &self,
        flow: &FlowDefinition,
        attributes: &DocumentAttributes,
        invalid: &mut Vec<InvalidCondition>,
    ) -> bool {
        // Every condition is checked so diagnostics list all invalid ones
        let mut holds = true;
        for condition in &flow.conditions {
            match self.evaluator.check(condition, attributes) {
                ConditionOutcome::Matched => {}
                ConditionOutcome::Invalid(reason) => {
                    invalid.push(InvalidCondition {
                        flow_id: flow.id,
                        condition_id: condition.id,
                        field: condition.field.clone(),
                        reason,
                    });
                    holds = false;
                }
                outcome => {
                    debug!(
                        flow_id = %flow.id,
                        field = %condition.field,
                        outcome = ?outcome,
                        "Condition did not match"
                    );
                    holds = false;
                }
            }
        }
        holds
    }
}

/// Total order over candidates, best first
fn precedence(a: &FlowDefinition, b: &FlowDefinition) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.is_default.cmp(&a.is_default))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
