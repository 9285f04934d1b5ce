use serde::{Deserialize, Serialize};
use std::fmt;

/// Flow instance states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Awaiting decisions on the current step
    #[default]
    Pending,
    /// Every step was satisfied or skipped
    Approved,
    /// A step was rejected or timed out without skip permission
    Rejected,
    /// Withdrawn before reaching a decision
    Cancelled,
}

impl InstanceState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for InstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid instance state: {s}")),
        }
    }
}

/// Step instance states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not yet reached
    #[default]
    Waiting,
    /// Accepting decisions
    Active,
    /// Quorum reached
    Satisfied,
    /// An approver rejected
    Rejected,
    /// Passed over by timeout policy or cancellation
    Skipped,
    /// Deadline elapsed, or no approvers could be resolved
    TimedOut,
}

impl StepState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting | Self::Active)
    }

    /// Check if the flow may move past this step
    pub fn allows_advance(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Skipped)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Satisfied => write!(f, "satisfied"),
            Self::Rejected => write!(f, "rejected"),
            Self::Skipped => write!(f, "skipped"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "satisfied" => Ok(Self::Satisfied),
            "rejected" => Ok(Self::Rejected),
            "skipped" => Ok(Self::Skipped),
            "timed_out" => Ok(Self::TimedOut),
            _ => Err(format!("Invalid step state: {s}")),
        }
    }
}
