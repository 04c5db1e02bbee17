//! Verdict Server — application entry point.
//!
//! Wires the SurrealDB repositories, the decision engine, the
//! administrative services, the AMQP event sink and tenant consumer, the
//! scheduled expiry sweep, and the HTTP adapter.

mod config;
mod http;

use std::sync::Arc;

use lapin::{Connection, ConnectionProperties};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use verdict_admin::{
    CrossTenantAccessService, MaintenanceService, PermissionService, PolicyService,
    ResourceService, RoleService, TenantSyncService, UserRoleService,
};
use verdict_db::{
    DbManager, SurrealCrossTenantAccessRepository, SurrealPermissionRepository,
    SurrealPolicyRepository, SurrealResourceRepository, SurrealRolePermissionRepository,
    SurrealRoleRepository, SurrealUserRoleRepository,
};
use verdict_engine::{AuthorizationEngine, DecisionCache, MemoryDecisionCache};
use verdict_events::{
    AmqpEventSink, EventSink, MemoryEventSink, TenantEventConsumer,
};

use config::AppConfig;
use http::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("verdict=info".parse().unwrap()),
        )
        .json()
        .init();

    info!("Starting Verdict server...");

    let config = AppConfig::from_env();

    // Database.
    let db = match DbManager::connect(&config.db).await {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "Failed to connect to SurrealDB");
            std::process::exit(1);
        }
    };
    if let Err(e) = verdict_db::run_migrations(db.client()).await {
        error!(error = %e, "Migrations failed");
        std::process::exit(1);
    }
    let client = db.client().clone();

    // Broker: the sink degrades to in-process recording when no broker
    // is configured or reachable; decisions never depend on it.
    let amqp = match &config.amqp_addr {
        Some(addr) => match Connection::connect(addr, ConnectionProperties::default()).await {
            Ok(connection) => Some(connection),
            Err(e) => {
                warn!(error = %e, "AMQP unreachable, events stay in-process");
                None
            }
        },
        None => {
            warn!("No AMQP address configured, events stay in-process");
            None
        }
    };

    let events: Arc<dyn EventSink> = match &amqp {
        Some(connection) => match connection.create_channel().await {
            Ok(channel) => Arc::new(AmqpEventSink::spawn(channel, config.sink.clone())),
            Err(e) => {
                warn!(error = %e, "AMQP channel failed, events stay in-process");
                Arc::new(MemoryEventSink::new())
            }
        },
        None => Arc::new(MemoryEventSink::new()),
    };

    let cache: Arc<dyn DecisionCache> = Arc::new(MemoryDecisionCache::new(config.cache_ttl));

    // Engine and services.
    let engine = AuthorizationEngine::new(
        SurrealUserRoleRepository::new(client.clone()),
        SurrealRoleRepository::new(client.clone()),
        SurrealRolePermissionRepository::new(client.clone()),
        SurrealResourceRepository::new(client.clone()),
        SurrealPolicyRepository::new(client.clone()),
        cache.clone(),
        events.clone(),
    )
    .with_max_hierarchy_depth(config.role_limits.max_hierarchy_depth);

    let tenant_sync = Arc::new(TenantSyncService::new(
        SurrealRoleRepository::new(client.clone()),
        SurrealPermissionRepository::new(client.clone()),
        SurrealRolePermissionRepository::new(client.clone()),
        SurrealUserRoleRepository::new(client.clone()),
        events.clone(),
        cache.clone(),
    ));

    if let Err(e) = tenant_sync.seed_permission_catalog().await {
        error!(error = %e, "Permission catalog seeding failed");
        std::process::exit(1);
    }

    let state = Arc::new(AppState {
        engine,
        roles: RoleService::new(
            SurrealRoleRepository::new(client.clone()),
            SurrealPermissionRepository::new(client.clone()),
            SurrealRolePermissionRepository::new(client.clone()),
            SurrealUserRoleRepository::new(client.clone()),
            events.clone(),
            cache.clone(),
            config.role_limits.clone(),
        ),
        permissions: PermissionService::new(
            SurrealPermissionRepository::new(client.clone()),
            cache.clone(),
        ),
        policies: PolicyService::new(
            SurrealPolicyRepository::new(client.clone()),
            events.clone(),
            cache.clone(),
        ),
        resources: ResourceService::new(
            SurrealResourceRepository::new(client.clone()),
            cache.clone(),
        ),
        user_roles: UserRoleService::new(
            SurrealUserRoleRepository::new(client.clone()),
            SurrealRoleRepository::new(client.clone()),
            events.clone(),
            cache.clone(),
        ),
        cross_tenant: CrossTenantAccessService::new(
            SurrealCrossTenantAccessRepository::new(client.clone()),
            events.clone(),
            cache.clone(),
        ),
    });

    // Tenant lifecycle consumer.
    if let Some(connection) = &amqp {
        match connection.create_channel().await {
            Ok(channel) => {
                let consumer =
                    TenantEventConsumer::new(channel, config.consumer.clone(), tenant_sync.clone());
                tokio::spawn(async move {
                    if let Err(e) = consumer.run().await {
                        error!(error = %e, "Tenant event consumer stopped");
                    }
                });
            }
            Err(e) => warn!(error = %e, "Consumer channel failed, tenant sync disabled"),
        }
    }

    // Scheduled expiry sweep.
    let scheduler = match JobScheduler::new().await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!(error = %e, "Failed to create job scheduler");
            std::process::exit(1);
        }
    };

    let sweep_client = client.clone();
    let sweep_cache = cache.clone();
    let sweep_job = Job::new_async(config.sweep_cron.as_str(), move |_uuid, _lock| {
        let client = sweep_client.clone();
        let cache = sweep_cache.clone();
        Box::pin(async move {
            let maintenance = MaintenanceService::new(
                SurrealPolicyRepository::new(client.clone()),
                SurrealRolePermissionRepository::new(client.clone()),
                SurrealUserRoleRepository::new(client.clone()),
                SurrealCrossTenantAccessRepository::new(client),
                cache,
            );
            if let Err(e) = maintenance.sweep().await {
                error!(error = %e, "Maintenance sweep failed");
            }
        })
    });

    match sweep_job {
        Ok(job) => {
            if let Err(e) = scheduler.add(job).await {
                error!(error = %e, "Failed to schedule maintenance sweep");
            }
        }
        Err(e) => error!(error = %e, "Invalid sweep cron expression"),
    }
    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Failed to start job scheduler");
    }

    // HTTP adapter.
    let router = http::router(state);
    let listener = match tokio::net::TcpListener::bind(&config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.http_addr, error = %e, "Failed to bind HTTP listener");
            std::process::exit(1);
        }
    };

    info!(addr = %config.http_addr, "Verdict server listening");

    let serve = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    });

    if let Err(e) = serve.await {
        error!(error = %e, "HTTP server error");
    }

    info!("Verdict server stopped.");
}
