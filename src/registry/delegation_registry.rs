//! # Delegation Registry
//!
//! Holds "A delegates to B between two instants" records.
//!
//! At most one delegation per delegator may cover any instant. Overlapping
//! records are refused when written rather than arbitrated when read, so
//! `active_delegation_for` never has to choose. Delegations do not chain: if
//! A delegates to B and B delegates to C, A's authority reaches B only.

use crate::clock::Clock;
use crate::error::{ApprovalError, Result};
use crate::models::{DelegationRecord, NewDelegation, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait DelegationRegistry: Send + Sync {
    /// Record a delegation, refusing overlaps with the delegator's other records
    async fn set_delegation(&self, delegation: NewDelegation) -> Result<DelegationRecord>;

    /// The delegate acting for `user_id` at `as_of`, if any
    async fn active_delegation_for(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Option<UserId>>;

    /// Users who have delegated to `delegate_id` at `as_of`
    async fn delegators_for(&self, delegate_id: &str, as_of: DateTime<Utc>) -> Result<Vec<UserId>>;

    /// Every record created by `user_id`, revoked ones included
    async fn delegations_for(&self, user_id: &str) -> Result<Vec<DelegationRecord>>;

    /// Withdraw a delegation; revoking twice is a no-op
    async fn revoke(&self, id: Uuid) -> Result<DelegationRecord>;
}

pub struct InMemoryDelegationRegistry {
    records: RwLock<Vec<DelegationRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDelegationRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            clock,
        }
    }

    fn validate(delegation: &NewDelegation) -> Result<()> {
        if delegation.user_id.trim().is_empty() || delegation.delegate_to_id.trim().is_empty() {
            return Err(ApprovalError::InvalidDelegation(
                "delegator and delegate are required".to_string(),
            ));
        }
        if delegation.user_id == delegation.delegate_to_id {
            return Err(ApprovalError::InvalidDelegation(format!(
                "{} cannot delegate to themselves",
                delegation.user_id
            )));
        }
        if delegation.end_date < delegation.start_date {
            return Err(ApprovalError::InvalidDelegation(format!(
                "end date {} precedes start date {}",
                delegation.end_date, delegation.start_date
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DelegationRegistry for InMemoryDelegationRegistry {
    async fn set_delegation(&self, delegation: NewDelegation) -> Result<DelegationRecord> {
        Self::validate(&delegation)?;

        let mut records = self.records.write();
        if let Some(existing) = records.iter().find(|record| {
            record.user_id == delegation.user_id
                && record.overlaps(delegation.start_date, delegation.end_date)
        }) {
            debug!(
                user_id = %delegation.user_id,
                existing_id = %existing.id,
                "Refusing overlapping delegation"
            );
            return Err(ApprovalError::DelegationConflict {
                user_id: delegation.user_id,
                existing_id: existing.id,
            });
        }

        let record = DelegationRecord {
            id: Uuid::new_v4(),
            user_id: delegation.user_id,
            delegate_to_id: delegation.delegate_to_id,
            start_date: delegation.start_date,
            end_date: delegation.end_date,
            reason: delegation.reason,
            revoked: false,
            created_at: self.clock.now(),
        };
        records.push(record.clone());

        info!(
            delegation_id = %record.id,
            user_id = %record.user_id,
            delegate_to_id = %record.delegate_to_id,
            start_date = %record.start_date,
            end_date = %record.end_date,
            "Delegation recorded"
        );
        Ok(record)
    }

    async fn active_delegation_for(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Option<UserId>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|record| record.user_id == user_id && record.is_active_at(as_of))
            .map(|record| record.delegate_to_id.clone()))
    }

    async fn delegators_for(&self, delegate_id: &str, as_of: DateTime<Utc>) -> Result<Vec<UserId>> {
        let mut delegators: Vec<UserId> = self
            .records
            .read()
            .iter()
            .filter(|record| record.delegate_to_id == delegate_id && record.is_active_at(as_of))
            .map(|record| record.user_id.clone())
            .collect();
        delegators.sort();
        delegators.dedup();
        Ok(delegators)
    }

    async fn delegations_for(&self, user_id: &str) -> Result<Vec<DelegationRecord>> {
        let mut records: Vec<DelegationRecord> = self
            .records
            .read()
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.start_date);
        Ok(records)
    }

    async fn revoke(&self, id: Uuid) -> Result<DelegationRecord> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| ApprovalError::InvalidDelegation(format!("delegation {id} not found")))?;
        if !record.revoked {
            record.revoked = true;
            info!(delegation_id = %id, user_id = %record.user_id, "Delegation revoked");
        }
        Ok(record.clone())
    }
}
