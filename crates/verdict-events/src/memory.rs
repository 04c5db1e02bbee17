//! In-memory event sink for tests and single-process deployments.
//!
//! Events are recorded in a buffer (for assertions) and broadcast to any
//! live subscribers. Broadcast delivery is best-effort: subscribers that
//! fall behind miss events, matching the fire-and-forget contract.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::events::AuthzEvent;
use crate::sink::EventSink;

const CHANNEL_CAPACITY: usize = 256;

pub struct MemoryEventSink {
    recorded: Mutex<Vec<AuthzEvent>>,
    tx: broadcast::Sender<AuthzEvent>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self {
            recorded: Mutex::new(Vec::new()),
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<AuthzEvent> {
        self.recorded.lock().expect("sink poisoned").clone()
    }

    /// Count of recorded events matching the predicate.
    pub fn count_matching(&self, predicate: impl Fn(&AuthzEvent) -> bool) -> usize {
        self.recorded
            .lock()
            .expect("sink poisoned")
            .iter()
            .filter(|e| predicate(e))
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthzEvent> {
        self.tx.subscribe()
    }
}

impl Default for MemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, event: AuthzEvent) {
        self.recorded
            .lock()
            .expect("sink poisoned")
            .push(event.clone());

        // Ignore error if no receivers (this is fine).
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn checked_event(allowed: bool) -> AuthzEvent {
        AuthzEvent::AuthorizationChecked {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            resource: "REPORT".into(),
            action: "READ".into(),
            allowed,
            reason: "Direct permission granted".into(),
            ip_address: None,
        }
    }

    #[tokio::test]
    async fn records_published_events() {
        let sink = MemoryEventSink::new();
        sink.publish(checked_event(true)).await;
        sink.publish(checked_event(false)).await;

        assert_eq!(sink.events().len(), 2);
        assert_eq!(
            sink.count_matching(|e| matches!(
                e,
                AuthzEvent::AuthorizationChecked { allowed: true, .. }
            )),
            1
        );
    }

    #[tokio::test]
    async fn broadcasts_to_subscribers() {
        let sink = MemoryEventSink::new();
        let mut rx = sink.subscribe();

        sink.publish(checked_event(true)).await;

        let received = rx.recv().await.unwrap();
        assert!(matches!(
            received,
            AuthzEvent::AuthorizationChecked { allowed: true, .. }
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let sink = MemoryEventSink::new();
        sink.publish(checked_event(true)).await;
        assert_eq!(sink.events().len(), 1);
    }
}
