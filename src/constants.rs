//! # Engine Constants
//!
//! Event names, default values and fixed reasons shared across the engine.

/// Event names emitted on every state transition
pub mod events {
    pub const STEP_ACTIVATED: &str = "step_activated";
    pub const STEP_SATISFIED: &str = "step_satisfied";
    pub const STEP_REJECTED: &str = "step_rejected";
    pub const STEP_SKIPPED: &str = "step_skipped";
    pub const STEP_TIMED_OUT: &str = "step_timed_out";
    pub const INSTANCE_APPROVED: &str = "instance_approved";
    pub const INSTANCE_REJECTED: &str = "instance_rejected";
    pub const INSTANCE_CANCELLED: &str = "instance_cancelled";
}

/// Reasons recorded on instances and steps
pub mod reasons {
    pub const STEP_TIMEOUT: &str = "step timeout";
    pub const STEP_TIMEOUT_SKIPPED: &str = "step timeout skipped";
    pub const APPROVER_REJECTED: &str = "approver rejected";
    pub const UNSATISFIABLE_STEP: &str = "unsatisfiable step";
    pub const UNSATISFIABLE_SKIPPED: &str = "unsatisfiable step skipped";
    pub const CANCELLED_BY_REQUESTER: &str = "cancelled by requester";
}

/// System-wide defaults
pub mod system {
    pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;
    pub const DEFAULT_ORGANIZATION_LEVELS: u32 = 1;
    pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;
    pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;
    /// Longest step timeout a definition may carry (ten years)
    pub const MAX_STEP_TIMEOUT_HOURS: u32 = 87_600;
    pub const CONFIG_FILE_NAMES: [&str; 2] = ["approval-config.yaml", "approval-config.yml"];
}
