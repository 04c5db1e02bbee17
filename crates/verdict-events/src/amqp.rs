//! AMQP event sink.
//!
//! Publication goes through a bounded in-process queue drained by a
//! background task, so a slow broker can never block a decision or an
//! administrative operation. When the queue is full the event is dropped
//! and logged.

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::events::{AuthzEvent, EventEnvelope};
use crate::sink::EventSink;

/// Configuration for the AMQP sink.
#[derive(Debug, Clone)]
pub struct AmqpSinkConfig {
    /// Topic exchange events are published to.
    pub exchange: String,
    /// Routing-key prefix; the event kind is appended
    /// (e.g. `verdict.events.authz` + `.role-created`).
    pub routing_key_prefix: String,
    /// Capacity of the in-process queue between callers and the
    /// publisher task.
    pub queue_capacity: usize,
}

impl Default for AmqpSinkConfig {
    fn default() -> Self {
        Self {
            exchange: "verdict.events".into(),
            routing_key_prefix: "verdict.events.authz".into(),
            queue_capacity: 1024,
        }
    }
}

pub struct AmqpEventSink {
    tx: mpsc::Sender<AuthzEvent>,
}

impl AmqpEventSink {
    /// Creates the sink and spawns the background publisher task on the
    /// given channel.
    pub fn spawn(channel: Channel, config: AmqpSinkConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        tokio::spawn(publisher_task(channel, config, rx));
        Self { tx }
    }
}

#[async_trait]
impl EventSink for AmqpEventSink {
    async fn publish(&self, event: AuthzEvent) {
        // try_send keeps the caller non-blocking; a full queue drops the
        // event rather than stalling the decision path.
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "Event queue full, dropping audit event");
        }
    }
}

async fn publisher_task(
    channel: Channel,
    config: AmqpSinkConfig,
    mut rx: mpsc::Receiver<AuthzEvent>,
) {
    while let Some(event) = rx.recv().await {
        let kind = event.kind();
        let routing_key = format!("{}.{}", config.routing_key_prefix, kind);
        let envelope = EventEnvelope::new(event);

        let payload = match serde_json::to_vec(&envelope) {
            Ok(p) => p,
            Err(e) => {
                error!(kind, error = %e, "Failed to serialize audit event");
                continue;
            }
        };

        let publish = channel
            .basic_publish(
                &config.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_message_id(envelope.metadata.event_id.to_string().into()),
            )
            .await;

        match publish {
            Ok(confirm) => {
                if let Err(e) = confirm.await {
                    error!(kind, error = %e, "Broker rejected audit event");
                } else {
                    debug!(kind, routing_key, "Published audit event");
                }
            }
            Err(e) => {
                error!(kind, error = %e, "Failed to publish audit event");
            }
        }
    }

    debug!("Event publisher task stopped");
}
