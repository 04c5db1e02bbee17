//! Tenant lifecycle event consumer.
//!
//! Messages are processed with manual acknowledgement. Malformed payloads
//! and invalid identifiers are acknowledged and dropped (redelivery cannot
//! fix them); handler failures classified as retryable are negatively
//! acknowledged with requeue so the broker redelivers with backoff and
//! eventually dead-letters.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use prost::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::proto::{TenantCreated, TenantDeactivated};

/// Error classification for message handling.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Transient failure; the message should be redelivered.
    #[error("retryable: {0}")]
    Retryable(String),
    /// Permanent failure; the message must be dropped.
    #[error("non-retryable: {0}")]
    NonRetryable(String),
}

/// What the consumer calls into once a message has been decoded and its
/// identifiers validated.
#[async_trait]
pub trait TenantLifecycleHandler: Send + Sync {
    async fn tenant_created(
        &self,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        correlation_id: &str,
    ) -> Result<(), HandlerError>;

    async fn tenant_deactivated(
        &self,
        tenant_id: Uuid,
        correlation_id: &str,
    ) -> Result<(), HandlerError>;
}

/// Queue names and consumer tuning.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub tenant_created_queue: String,
    pub tenant_deactivated_queue: String,
    /// Unacknowledged message window per consumer.
    pub prefetch: u16,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            tenant_created_queue: "verdict.events.tenant.created".into(),
            tenant_deactivated_queue: "verdict.events.tenant.deactivated".into(),
            prefetch: 5,
        }
    }
}

pub struct TenantEventConsumer<H> {
    channel: Channel,
    config: ConsumerConfig,
    handler: std::sync::Arc<H>,
}

impl<H: TenantLifecycleHandler + 'static> TenantEventConsumer<H> {
    pub fn new(channel: Channel, config: ConsumerConfig, handler: std::sync::Arc<H>) -> Self {
        Self {
            channel,
            config,
            handler,
        }
    }

    /// Runs both queue consumers until the channel closes.
    pub async fn run(self) -> Result<(), lapin::Error> {
        self.channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;

        let created = self
            .channel
            .basic_consume(
                &self.config.tenant_created_queue,
                "verdict-tenant-created",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let deactivated = self
            .channel
            .basic_consume(
                &self.config.tenant_deactivated_queue,
                "verdict-tenant-deactivated",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            created_queue = %self.config.tenant_created_queue,
            deactivated_queue = %self.config.tenant_deactivated_queue,
            "Tenant event consumer started"
        );

        let handler = self.handler.clone();
        let created_task = tokio::spawn(async move {
            let mut stream = created;
            while let Some(delivery) = stream.next().await {
                match delivery {
                    Ok(delivery) => handle_created(&*handler, delivery).await,
                    Err(e) => {
                        error!(error = %e, "Tenant-created consumer stream error");
                        break;
                    }
                }
            }
        });

        let handler = self.handler.clone();
        let deactivated_task = tokio::spawn(async move {
            let mut stream = deactivated;
            while let Some(delivery) = stream.next().await {
                match delivery {
                    Ok(delivery) => handle_deactivated(&*handler, delivery).await,
                    Err(e) => {
                        error!(error = %e, "Tenant-deactivated consumer stream error");
                        break;
                    }
                }
            }
        });

        let _ = tokio::join!(created_task, deactivated_task);
        Ok(())
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
        error!(error = %e, "Failed to acknowledge message");
    }
}

async fn nack_requeue(delivery: &Delivery) {
    let options = BasicNackOptions {
        requeue: true,
        ..Default::default()
    };
    if let Err(e) = delivery.acker.nack(options).await {
        error!(error = %e, "Failed to negatively acknowledge message");
    }
}

/// Validates a required UUID field at the boundary. Parse failures are
/// non-retryable.
fn parse_required_uuid(field: &str, value: &str) -> Result<Uuid, HandlerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HandlerError::NonRetryable(format!("{field} is empty")));
    }
    Uuid::parse_str(trimmed)
        .map_err(|e| HandlerError::NonRetryable(format!("invalid {field} '{trimmed}': {e}")))
}

async fn handle_created<H: TenantLifecycleHandler>(handler: &H, delivery: Delivery) {
    let event = match TenantCreated::decode(delivery.data.as_slice()) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Failed to decode tenant-created payload, dropping");
            ack(&delivery).await;
            return;
        }
    };

    let metadata = event.metadata.unwrap_or_default();
    let correlation_id = metadata.correlation_id;
    let tenant = event.tenant.unwrap_or_default();

    let outcome = async {
        let tenant_id = parse_required_uuid("tenant_id", &tenant.tenant_id)?;
        let user_id = if metadata.user_id.trim().is_empty() {
            None
        } else {
            Some(parse_required_uuid("user_id", &metadata.user_id)?)
        };

        info!(
            tenant_id = %tenant_id,
            tenant_code = %tenant.tenant_code,
            correlation_id = %correlation_id,
            "Processing tenant-created event"
        );

        handler
            .tenant_created(tenant_id, user_id, &correlation_id)
            .await
    }
    .await;

    match outcome {
        Ok(()) => {
            ack(&delivery).await;
            info!(correlation_id = %correlation_id, "Tenant-created event processed");
        }
        Err(HandlerError::NonRetryable(reason)) => {
            error!(
                correlation_id = %correlation_id,
                reason,
                "Non-retryable tenant-created failure, dropping"
            );
            ack(&delivery).await;
        }
        Err(HandlerError::Retryable(reason)) => {
            warn!(
                correlation_id = %correlation_id,
                reason,
                "Retryable tenant-created failure, requeueing"
            );
            nack_requeue(&delivery).await;
        }
    }
}

async fn handle_deactivated<H: TenantLifecycleHandler>(handler: &H, delivery: Delivery) {
    let event = match TenantDeactivated::decode(delivery.data.as_slice()) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Failed to decode tenant-deactivated payload, dropping");
            ack(&delivery).await;
            return;
        }
    };

    let correlation_id = event
        .metadata
        .map(|m| m.correlation_id)
        .unwrap_or_default();

    let outcome = async {
        let tenant_id = parse_required_uuid("tenant_id", &event.tenant_id)?;

        info!(
            tenant_id = %tenant_id,
            correlation_id = %correlation_id,
            "Processing tenant-deactivated event"
        );

        handler.tenant_deactivated(tenant_id, &correlation_id).await
    }
    .await;

    match outcome {
        Ok(()) => {
            ack(&delivery).await;
            info!(correlation_id = %correlation_id, "Tenant-deactivated event processed");
        }
        Err(HandlerError::NonRetryable(reason)) => {
            error!(
                correlation_id = %correlation_id,
                reason,
                "Non-retryable tenant-deactivated failure, dropping"
            );
            ack(&delivery).await;
        }
        Err(HandlerError::Retryable(reason)) => {
            warn!(
                correlation_id = %correlation_id,
                reason,
                "Retryable tenant-deactivated failure, requeueing"
            );
            nack_requeue(&delivery).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_uuid() {
        let err = parse_required_uuid("tenant_id", "  ").unwrap_err();
        assert!(matches!(err, HandlerError::NonRetryable(_)));
    }

    #[test]
    fn rejects_malformed_uuid() {
        let err = parse_required_uuid("tenant_id", "not-a-uuid").unwrap_err();
        assert!(matches!(err, HandlerError::NonRetryable(_)));
    }

    #[test]
    fn accepts_valid_uuid_with_whitespace() {
        let id = parse_required_uuid("tenant_id", " 5f64d4a0-0000-4000-8000-000000000001 ")
            .unwrap();
        assert_eq!(
            id.to_string(),
            "5f64d4a0-0000-4000-8000-000000000001"
        );
    }
}
