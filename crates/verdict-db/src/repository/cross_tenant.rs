//! SurrealDB implementation of [`CrossTenantAccessRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use verdict_core::error::VerdictResult;
use verdict_core::models::cross_tenant::{CreateCrossTenantAccess, CrossTenantAccess};
use verdict_core::repository::CrossTenantAccessRepository;

use crate::error::{DbError, classify_write_error};
use crate::repository::parse_uuid;

#[derive(Debug, SurrealValue)]
struct AccessRow {
    source_tenant_id: String,
    target_tenant_id: String,
    resource_type: String,
    resource_id: Option<String>,
    permissions: Vec<String>,
    conditions: serde_json::Value,
    granted_by: String,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
    revoked_at: Option<DateTime<Utc>>,
    is_active: bool,
}

#[derive(Debug, SurrealValue)]
struct AccessRowWithId {
    record_id: String,
    source_tenant_id: String,
    target_tenant_id: String,
    resource_type: String,
    resource_id: Option<String>,
    permissions: Vec<String>,
    conditions: serde_json::Value,
    granted_by: String,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
    revoked_at: Option<DateTime<Utc>>,
    is_active: bool,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

impl AccessRowWithId {
    fn try_into_access(self) -> Result<CrossTenantAccess, DbError> {
        Ok(CrossTenantAccess {
            id: parse_uuid("cross_tenant_access", &self.record_id)?,
            source_tenant_id: parse_uuid("source tenant", &self.source_tenant_id)?,
            target_tenant_id: parse_uuid("target tenant", &self.target_tenant_id)?,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            permissions: self.permissions,
            conditions: self.conditions,
            granted_by: self.granted_by,
            granted_at: self.granted_at,
            expires_at: self.expires_at,
            revoked_by: self.revoked_by,
            revoked_at: self.revoked_at,
            is_active: self.is_active,
        })
    }
}

const SELECT_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM cross_tenant_access";

/// SurrealDB implementation of the cross-tenant access repository.
#[derive(Clone)]
pub struct SurrealCrossTenantAccessRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCrossTenantAccessRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CrossTenantAccessRepository for SurrealCrossTenantAccessRepository<C> {
    async fn create(&self, input: CreateCrossTenantAccess) -> VerdictResult<CrossTenantAccess> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let conditions = input.conditions.unwrap_or_else(|| serde_json::json!({}));

        let result = self
            .db
            .query(
                "CREATE type::record('cross_tenant_access', $id) SET \
                 source_tenant_id = $source_tenant_id, \
                 target_tenant_id = $target_tenant_id, \
                 resource_type = $resource_type, \
                 resource_id = $resource_id, \
                 permissions = $permissions, conditions = $conditions, \
                 granted_by = $granted_by, expires_at = $expires_at, \
                 revoked_by = NONE, revoked_at = NONE, is_active = true",
            )
            .bind(("id", id_str.clone()))
            .bind(("source_tenant_id", input.source_tenant_id.to_string()))
            .bind(("target_tenant_id", input.target_tenant_id.to_string()))
            .bind(("resource_type", input.resource_type))
            .bind(("resource_id", input.resource_id))
            .bind(("permissions", input.permissions))
            .bind(("conditions", conditions))
            .bind(("granted_by", input.granted_by))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| classify_write_error("cross_tenant_access", e))?;

        let rows: Vec<AccessRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "cross_tenant_access".into(),
            id: id_str.clone(),
        })?;

        Ok(CrossTenantAccess {
            id,
            source_tenant_id: parse_uuid("source tenant", &row.source_tenant_id)?,
            target_tenant_id: parse_uuid("target tenant", &row.target_tenant_id)?,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            permissions: row.permissions,
            conditions: row.conditions,
            granted_by: row.granted_by,
            granted_at: row.granted_at,
            expires_at: row.expires_at,
            revoked_by: row.revoked_by,
            revoked_at: row.revoked_at,
            is_active: row.is_active,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> VerdictResult<CrossTenantAccess> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE meta::id(id) = $id"
            ))
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccessRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "cross_tenant_access".into(),
            id: id_str,
        })?;

        Ok(row.try_into_access()?)
    }

    async fn exists_active(
        &self,
        source_tenant_id: Uuid,
        target_tenant_id: Uuid,
        resource_type: &str,
    ) -> VerdictResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM cross_tenant_access \
                 WHERE source_tenant_id = $source_tenant_id \
                 AND target_tenant_id = $target_tenant_id \
                 AND resource_type = $resource_type \
                 AND is_active = true GROUP ALL",
            )
            .bind(("source_tenant_id", source_tenant_id.to_string()))
            .bind(("target_tenant_id", target_tenant_id.to_string()))
            .bind(("resource_type", resource_type.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }

    async fn find_active(
        &self,
        source_tenant_id: Uuid,
        target_tenant_id: Uuid,
        resource_type: &str,
    ) -> VerdictResult<Vec<CrossTenantAccess>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} \
                 WHERE source_tenant_id = $source_tenant_id \
                 AND target_tenant_id = $target_tenant_id \
                 AND resource_type = $resource_type \
                 AND is_active = true"
            ))
            .bind(("source_tenant_id", source_tenant_id.to_string()))
            .bind(("target_tenant_id", target_tenant_id.to_string()))
            .bind(("resource_type", resource_type.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccessRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_access())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn list_active_by_tenant(&self, tenant_id: Uuid) -> VerdictResult<Vec<CrossTenantAccess>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} \
                 WHERE (source_tenant_id = $tenant_id \
                 OR target_tenant_id = $tenant_id) \
                 AND is_active = true \
                 ORDER BY granted_at DESC"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccessRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_access())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn revoke(
        &self,
        id: Uuid,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> VerdictResult<()> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('cross_tenant_access', $id) SET \
                 is_active = false, revoked_by = $revoked_by, \
                 revoked_at = $revoked_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("revoked_by", revoked_by.to_string()))
            .bind(("revoked_at", revoked_at))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccessRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "cross_tenant_access".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> VerdictResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM cross_tenant_access \
                 WHERE is_active = true AND expires_at != NONE \
                 AND expires_at < $now GROUP ALL; \
                 UPDATE cross_tenant_access SET is_active = false \
                 WHERE is_active = true AND expires_at != NONE \
                 AND expires_at < $now;",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
