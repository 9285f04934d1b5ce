use serde::{Deserialize, Serialize};

/// Events that can trigger step state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StepEvent {
    /// Start accepting decisions
    Activate,
    /// Quorum reached
    Satisfy,
    /// An approver rejected
    Reject,
    /// Pass over the step with a reason
    Skip(String),
    /// Deadline elapsed or no approvers resolved
    TimeOut,
}

impl StepEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Satisfy => "satisfy",
            Self::Reject => "reject",
            Self::Skip(_) => "skip",
            Self::TimeOut => "time_out",
        }
    }
}

/// Events that can trigger flow instance state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InstanceEvent {
    /// Last step satisfied or skipped
    Approve,
    /// Rejected with reason
    Reject(String),
    /// Withdrawn by the originating document
    Cancel,
}

impl InstanceEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject(_) => "reject",
            Self::Cancel => "cancel",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Reject(reason) => Some(reason),
            _ => None,
        }
    }
}
