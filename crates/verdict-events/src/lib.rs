//! Verdict Events — audit event types, publication sinks, and the tenant
//! lifecycle consumer.
//!
//! Publication is fire-and-forget from the service's perspective: sinks
//! never propagate errors to the operation that emitted the event. The
//! consumer side applies at-least-once semantics with manual
//! acknowledgement and retryable/non-retryable error classification.

mod amqp;
mod consumer;
mod events;
mod memory;
pub mod proto;
mod sink;

pub use amqp::{AmqpEventSink, AmqpSinkConfig};
pub use consumer::{ConsumerConfig, HandlerError, TenantEventConsumer, TenantLifecycleHandler};
pub use events::{AuthzEvent, EventEnvelope, EventMetadata};
pub use memory::MemoryEventSink;
pub use sink::{EventSink, NullEventSink};
