pub mod publisher;
pub mod types;

// Re-export key types for convenience
pub use publisher::{EventPublisher, PublishError};
pub use types::{ApprovalEvent, ApprovalEventKind};
