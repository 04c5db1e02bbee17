//! SurrealDB implementation of [`RolePermissionRepository`].

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use verdict_core::error::VerdictResult;
use verdict_core::models::role_permission::{CreateRolePermission, RolePermission};
use verdict_core::models::user_role::PermissionGrant;
use verdict_core::repository::RolePermissionRepository;

use crate::error::{DbError, classify_write_error};
use crate::repository::parse_uuid;
use crate::repository::permission::{PermissionRowWithId, rows_into_permissions};

#[derive(Debug, SurrealValue)]
struct GrantRow {
    role_id: String,
    permission_id: String,
    constraints: serde_json::Value,
    granted_by: String,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
pub(crate) struct GrantRowWithId {
    record_id: String,
    role_id: String,
    permission_id: String,
    constraints: serde_json::Value,
    granted_by: String,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

impl GrantRowWithId {
    pub(crate) fn try_into_grant(self) -> Result<RolePermission, DbError> {
        Ok(RolePermission {
            id: parse_uuid("role_permission", &self.record_id)?,
            role_id: parse_uuid("role", &self.role_id)?,
            permission_id: parse_uuid("permission", &self.permission_id)?,
            constraints: self.constraints,
            granted_by: self.granted_by,
            granted_at: self.granted_at,
            expires_at: self.expires_at,
        })
    }
}

const SELECT_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM role_permission";
const SELECT_PERMISSION_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM permission";

/// SurrealDB implementation of the role-permission grant repository.
#[derive(Clone)]
pub struct SurrealRolePermissionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRolePermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Loads unexpired grants for a set of roles, joined with their active
    /// permissions. Shared by `list_active_grants` and the user-role
    /// binding assembly.
    pub(crate) async fn grants_for_roles(
        db: &Surreal<C>,
        role_ids: Vec<String>,
    ) -> Result<Vec<PermissionGrant>, DbError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = db
            .query(format!(
                "{SELECT_WITH_ID} WHERE role_id IN $role_ids \
                 AND (expires_at = NONE OR expires_at > time::now())"
            ))
            .bind(("role_ids", role_ids))
            .await
            .map_err(DbError::from)?;

        let grant_rows: Vec<GrantRowWithId> = result.take(0).map_err(DbError::from)?;
        if grant_rows.is_empty() {
            return Ok(Vec::new());
        }

        let permission_ids: Vec<String> = grant_rows
            .iter()
            .map(|r| r.permission_id.clone())
            .collect();

        let mut result = db
            .query(format!(
                "{SELECT_PERMISSION_WITH_ID} WHERE meta::id(id) IN $ids \
                 AND is_active = true"
            ))
            .bind(("ids", permission_ids))
            .await
            .map_err(DbError::from)?;

        let permission_rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let permissions: HashMap<Uuid, _> = rows_into_permissions(permission_rows)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut grants = Vec::new();
        for row in grant_rows {
            let grant = row.try_into_grant()?;
            // Inactive permissions were filtered by the query above.
            if let Some(permission) = permissions.get(&grant.permission_id) {
                grants.push(PermissionGrant {
                    grant,
                    permission: permission.clone(),
                });
            }
        }

        Ok(grants)
    }
}

impl<C: Connection> RolePermissionRepository for SurrealRolePermissionRepository<C> {
    async fn create(&self, input: CreateRolePermission) -> VerdictResult<RolePermission> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let constraints = input
            .constraints
            .unwrap_or_else(|| serde_json::json!({}));

        let result = self
            .db
            .query(
                "CREATE type::record('role_permission', $id) SET \
                 role_id = $role_id, permission_id = $permission_id, \
                 constraints = $constraints, granted_by = $granted_by, \
                 expires_at = $expires_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("role_id", input.role_id.to_string()))
            .bind(("permission_id", input.permission_id.to_string()))
            .bind(("constraints", constraints))
            .bind(("granted_by", input.granted_by))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| classify_write_error("role_permission", e))?;

        let rows: Vec<GrantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role_permission".into(),
            id: id_str,
        })?;

        Ok(RolePermission {
            id,
            role_id: parse_uuid("role", &row.role_id)?,
            permission_id: parse_uuid("permission", &row.permission_id)?,
            constraints: row.constraints,
            granted_by: row.granted_by,
            granted_at: row.granted_at,
            expires_at: row.expires_at,
        })
    }

    async fn exists(&self, role_id: Uuid, permission_id: Uuid) -> VerdictResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM role_permission \
                 WHERE role_id = $role_id \
                 AND permission_id = $permission_id GROUP ALL",
            )
            .bind(("role_id", role_id.to_string()))
            .bind(("permission_id", permission_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }

    async fn count_by_role(&self, role_id: Uuid) -> VerdictResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM role_permission \
                 WHERE role_id = $role_id GROUP ALL",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn list_active_grants(&self, role_id: Uuid) -> VerdictResult<Vec<PermissionGrant>> {
        Ok(Self::grants_for_roles(&self.db, vec![role_id.to_string()]).await?)
    }

    async fn list_by_role(&self, role_id: Uuid) -> VerdictResult<Vec<RolePermission>> {
        let mut result = self
            .db
            .query(format!("{SELECT_WITH_ID} WHERE role_id = $role_id"))
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GrantRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_grant())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn remove(&self, role_id: Uuid, permission_id: Uuid) -> VerdictResult<()> {
        self.db
            .query(
                "DELETE role_permission WHERE role_id = $role_id \
                 AND permission_id = $permission_id",
            )
            .bind(("role_id", role_id.to_string()))
            .bind(("permission_id", permission_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn remove_all_for_role(&self, role_id: Uuid) -> VerdictResult<()> {
        self.db
            .query("DELETE role_permission WHERE role_id = $role_id")
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn set_expiration(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> VerdictResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE role_permission SET expires_at = $expires_at \
                 WHERE role_id = $role_id \
                 AND permission_id = $permission_id",
            )
            .bind(("role_id", role_id.to_string()))
            .bind(("permission_id", permission_id.to_string()))
            .bind(("expires_at", expires_at))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GrantRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "role_permission".into(),
                id: format!("{role_id}:{permission_id}"),
            }
            .into());
        }

        Ok(())
    }

    async fn update_constraints(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        constraints: serde_json::Value,
    ) -> VerdictResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE role_permission SET constraints = $constraints \
                 WHERE role_id = $role_id \
                 AND permission_id = $permission_id",
            )
            .bind(("role_id", role_id.to_string()))
            .bind(("permission_id", permission_id.to_string()))
            .bind(("constraints", constraints))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GrantRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "role_permission".into(),
                id: format!("{role_id}:{permission_id}"),
            }
            .into());
        }

        Ok(())
    }

    async fn find_expiring(
        &self,
        role_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> VerdictResult<Vec<RolePermission>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE role_id = $role_id \
                 AND expires_at != NONE \
                 AND expires_at > $from AND expires_at <= $until"
            ))
            .bind(("role_id", role_id.to_string()))
            .bind(("from", from))
            .bind(("until", until))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GrantRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_grant())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> VerdictResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM role_permission \
                 WHERE expires_at != NONE AND expires_at < $now GROUP ALL; \
                 DELETE role_permission \
                 WHERE expires_at != NONE AND expires_at < $now;",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
