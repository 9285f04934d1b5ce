use serde::{Deserialize, Serialize};
use std::fmt;

/// Business documents that can be routed through an approval flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LeaveRequest,
    OvertimeRequest,
    ExpenseClaim,
    BusinessTrip,
    PurchaseRequest,
    /// Scheduled change: new hire
    Hire,
    /// Scheduled change: department or position transfer
    Transfer,
    /// Scheduled change: retirement
    Retirement,
}

impl DocumentType {
    pub const ALL: [DocumentType; 8] = [
        Self::LeaveRequest,
        Self::OvertimeRequest,
        Self::ExpenseClaim,
        Self::BusinessTrip,
        Self::PurchaseRequest,
        Self::Hire,
        Self::Transfer,
        Self::Retirement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeaveRequest => "leave_request",
            Self::OvertimeRequest => "overtime_request",
            Self::ExpenseClaim => "expense_claim",
            Self::BusinessTrip => "business_trip",
            Self::PurchaseRequest => "purchase_request",
            Self::Hire => "hire",
            Self::Transfer => "transfer",
            Self::Retirement => "retirement",
        }
    }

    /// HR scheduled changes, as opposed to employee-initiated requests
    pub fn is_scheduled_change(&self) -> bool {
        matches!(self, Self::Hire | Self::Transfer | Self::Retirement)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|doc| doc.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid document type: {s}"))
    }
}
