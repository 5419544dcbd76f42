//! Event bus for Caseflow.
//!
//! A Tokio broadcast channel carries workflow notifications to in-process
//! listeners (websocket fan-out, future integrations). Delivery is best
//! effort and never part of the transactional guarantee: a publish with no
//! listeners is fine, and a slow listener only loses its own backlog.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by workflow operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CaseEvent {
    /// A new alert has been created.
    AlertCreated { alert_id: i64, customer_id: i64 },

    /// An alert's status changed (update, escalate, merge, unmerge).
    AlertStatusChanged {
        alert_id: i64,
        old_status_id: i64,
        new_status_id: i64,
    },

    /// A case was created by escalation.
    CaseCreated { case_id: i64, from_alert_ids: Vec<i64> },

    /// An alert was merged into an existing case.
    AlertMerged { alert_id: i64, case_id: i64 },

    /// A comment was added to an alert.
    CommentAdded { alert_id: i64, comment_id: i64 },
}

impl CaseEvent {
    /// Returns the event type as a string for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            CaseEvent::AlertCreated { .. } => "alert_created",
            CaseEvent::AlertStatusChanged { .. } => "alert_status_changed",
            CaseEvent::CaseCreated { .. } => "case_created",
            CaseEvent::AlertMerged { .. } => "alert_merged",
            CaseEvent::CommentAdded { .. } => "comment_added",
        }
    }
}

/// Central event bus for workflow notifications.
pub struct EventBus {
    broadcast_tx: broadcast::Sender<CaseEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self { broadcast_tx }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Delivery is best effort and never part of the transactional
    /// guarantee: an event with no listeners is dropped silently.
    pub fn publish(&self, event: CaseEvent) {
        let event_type = event.event_type();
        match self.broadcast_tx.send(event) {
            Ok(count) => debug!(event_type, "Event broadcast to {} receivers", count),
            Err(_) => debug!(event_type, "Event dropped, no receivers"),
        }
    }

    /// Subscribes to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<CaseEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Number of active broadcast receivers.
    pub fn receiver_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_receivers_is_silent() {
        let bus = EventBus::new(16);
        bus.publish(CaseEvent::AlertCreated {
            alert_id: 1,
            customer_id: 1,
        });
        // A later subscriber starts with an empty backlog.
        let mut rx = bus.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(CaseEvent::AlertMerged {
            alert_id: 3,
            case_id: 7,
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "alert_merged");
    }

    #[tokio::test]
    async fn test_receiver_count() {
        let bus = EventBus::new(16);
        assert_eq!(bus.receiver_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
    }
}
