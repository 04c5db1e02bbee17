//! Event sink abstraction.

use async_trait::async_trait;

use crate::events::AuthzEvent;

/// Destination for audit events.
///
/// Implementations must be fire-and-forget: `publish` never returns an
/// error and must not block the caller on broker I/O. A slow or
/// unavailable broker costs events, not decisions.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: AuthzEvent);
}

/// Sink that drops every event. Useful for wiring paths where auditing
/// is disabled.
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: AuthzEvent) {}
}
