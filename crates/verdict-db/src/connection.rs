//! SurrealDB connection lifecycle.
//!
//! The decision path treats the relational store as a network
//! dependency that may not be up yet when the service starts (rolling
//! deploys bring the store and the service up in arbitrary order), so
//! establishing the connection retries with a fixed delay before giving
//! up. Once connected, a ping verifies the session actually answers
//! queries before repositories are handed out.

use std::time::Duration;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::{info, warn};

use crate::error::DbError;

/// Connection settings for the SurrealDB store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket endpoint, host and port (e.g. `127.0.0.1:8000`).
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// How many times to try establishing the connection at startup.
    pub connect_attempts: u32,
    /// Delay between connection attempts.
    pub retry_delay: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:8000".into(),
            namespace: "verdict".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
            connect_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Holds the authenticated SurrealDB session repositories are built on.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Establish the store connection, retrying transient failures.
    ///
    /// Signs in as root and selects the configured namespace and
    /// database, then pings the session. The returned manager is ready
    /// for repository construction.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let attempts = config.connect_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match Self::try_connect(config).await {
                Ok(manager) => {
                    info!(
                        endpoint = %config.endpoint,
                        namespace = %config.namespace,
                        database = %config.database,
                        attempt,
                        "Connected to SurrealDB"
                    );
                    manager.ping().await?;
                    return Ok(manager);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        endpoint = %config.endpoint,
                        attempt,
                        attempts,
                        error = %e,
                        "SurrealDB connection attempt failed, retrying"
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
                Err(e) => return Err(DbError::Surreal(e)),
            }
        }
    }

    async fn try_connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        let db = Surreal::new::<Ws>(&config.endpoint).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        Ok(Self { db })
    }

    /// Round-trip a trivial query to confirm the session is usable.
    /// Also serves liveness probes.
    pub async fn ping(&self) -> Result<(), DbError> {
        self.db
            .query("RETURN true")
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;
        Ok(())
    }

    /// The underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}
