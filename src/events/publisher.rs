use super::types::ApprovalEvent;
use tokio::sync::broadcast;

/// Fan-out publisher for approval lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<ApprovalEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish one event
    pub fn publish(&self, event: ApprovalEvent) -> Result<(), PublishError> {
        tracing::debug!(
            event = %event.kind,
            instance_id = %event.instance_id,
            step_index = event.step_index,
            "Publishing approval event"
        );

        // No subscribers is acceptable; events are fire-and-forget
        match self.sender.send(event) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Publish events in transition order
    pub fn publish_all(&self, events: impl IntoIterator<Item = ApprovalEvent>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::system::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}
