use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time-bounded transfer of one user's approval authority to another.
/// Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub id: Uuid,
    /// The delegator
    pub user_id: UserId,
    pub delegate_to_id: UserId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub reason: Option<String>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl DelegationRecord {
    pub fn is_active_at(&self, instant: DateTime<Utc>) -> bool {
        !self.revoked && self.start_date <= instant && instant <= self.end_date
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !self.revoked && self.start_date <= end && start <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDelegation {
    pub user_id: UserId,
    pub delegate_to_id: UserId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub reason: Option<String>,
}
