//! Server configuration, read from the environment.

use std::env;
use std::time::Duration;
use verdict_admin::RoleLimits;
use verdict_db::DbConfig;
use verdict_events::{AmqpSinkConfig, ConsumerConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    /// AMQP broker address; `None` disables eventing and the consumer.
    pub amqp_addr: Option<String>,
    pub sink: AmqpSinkConfig,
    pub consumer: ConsumerConfig,
    pub http_addr: String,
    pub cache_ttl: Duration,
    /// Six-field cron expression for the expiry sweep.
    pub sweep_cron: String,
    pub role_limits: RoleLimits,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            db: DbConfig {
                endpoint: var_or("VERDICT_DB_URL", "127.0.0.1:8000"),
                namespace: var_or("VERDICT_DB_NAMESPACE", "verdict"),
                database: var_or("VERDICT_DB_NAME", "main"),
                username: var_or("VERDICT_DB_USER", "root"),
                password: var_or("VERDICT_DB_PASS", "root"),
                connect_attempts: parse_or("VERDICT_DB_CONNECT_ATTEMPTS", 5),
                retry_delay: Duration::from_secs(parse_or("VERDICT_DB_RETRY_DELAY_SECS", 2)),
            },
            amqp_addr: env::var("VERDICT_AMQP_ADDR").ok(),
            sink: AmqpSinkConfig {
                exchange: var_or("VERDICT_EVENT_EXCHANGE", "verdict.events"),
                routing_key_prefix: var_or(
                    "VERDICT_EVENT_ROUTING_PREFIX",
                    "verdict.events.authz",
                ),
                queue_capacity: parse_or("VERDICT_EVENT_QUEUE_CAPACITY", 1024),
            },
            consumer: ConsumerConfig {
                tenant_created_queue: var_or(
                    "VERDICT_TENANT_CREATED_QUEUE",
                    "verdict.events.tenant.created",
                ),
                tenant_deactivated_queue: var_or(
                    "VERDICT_TENANT_DEACTIVATED_QUEUE",
                    "verdict.events.tenant.deactivated",
                ),
                prefetch: parse_or("VERDICT_CONSUMER_PREFETCH", 5),
            },
            http_addr: var_or("VERDICT_HTTP_ADDR", "0.0.0.0:8080"),
            cache_ttl: Duration::from_secs(parse_or("VERDICT_CACHE_TTL_SECS", 300)),
            sweep_cron: var_or("VERDICT_SWEEP_CRON", "0 0 * * * *"),
            role_limits: RoleLimits {
                max_hierarchy_depth: parse_or("VERDICT_MAX_HIERARCHY_DEPTH", 10),
                max_permissions_per_role: parse_or("VERDICT_MAX_PERMISSIONS_PER_ROLE", 100),
            },
        }
    }
}
