//! SurrealDB implementation of [`UserRoleRepository`].
//!
//! `find_active_bindings` is the hot-path query: it assembles the
//! assignment → role → grants aggregate the decision engine consumes,
//! using three batched lookups instead of per-role round trips.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use verdict_core::error::VerdictResult;
use verdict_core::models::role::Role;
use verdict_core::models::user_role::{CreateUserRole, UserRole, UserRoleBinding};
use verdict_core::repository::UserRoleRepository;

use crate::error::{DbError, classify_write_error};
use crate::repository::{parse_opt_uuid, parse_uuid};
use crate::repository::role_permission::SurrealRolePermissionRepository;

#[derive(Debug, SurrealValue)]
struct UserRoleRow {
    user_id: String,
    role_id: String,
    tenant_id: String,
    assigned_by: String,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
}

#[derive(Debug, SurrealValue)]
struct UserRoleRowWithId {
    record_id: String,
    user_id: String,
    role_id: String,
    tenant_id: String,
    assigned_by: String,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
}

#[derive(Debug, SurrealValue)]
struct RoleRowWithId {
    record_id: String,
    tenant_id: Option<String>,
    name: String,
    description: String,
    priority: i32,
    max_users: Option<u32>,
    is_system: bool,
    is_active: bool,
    parent_role_id: Option<String>,
    created_by: String,
    updated_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

impl UserRoleRowWithId {
    fn try_into_user_role(self) -> Result<UserRole, DbError> {
        Ok(UserRole {
            id: parse_uuid("user_role", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            role_id: parse_uuid("role", &self.role_id)?,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            assigned_by: self.assigned_by,
            assigned_at: self.assigned_at,
            expires_at: self.expires_at,
            is_active: self.is_active,
        })
    }
}

impl RoleRowWithId {
    fn try_into_role(self) -> Result<Role, DbError> {
        Ok(Role {
            id: parse_uuid("role", &self.record_id)?,
            tenant_id: parse_opt_uuid("tenant", self.tenant_id)?,
            name: self.name,
            description: self.description,
            priority: self.priority,
            max_users: self.max_users,
            is_system: self.is_system,
            is_active: self.is_active,
            parent_role_id: parse_opt_uuid("parent role", self.parent_role_id)?,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

const SELECT_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM user_role";

/// SurrealDB implementation of the user-role assignment repository.
#[derive(Clone)]
pub struct SurrealUserRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn take_assignments(&self, query: String, user_id: String) -> VerdictResult<Vec<UserRole>> {
        let mut result = self
            .db
            .query(query)
            .bind(("user_id", user_id))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_user_role())
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

impl<C: Connection> UserRoleRepository for SurrealUserRoleRepository<C> {
    async fn create(&self, input: CreateUserRole) -> VerdictResult<UserRole> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user_role', $id) SET \
                 user_id = $user_id, role_id = $role_id, \
                 tenant_id = $tenant_id, assigned_by = $assigned_by, \
                 expires_at = $expires_at, is_active = true",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("role_id", input.role_id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("assigned_by", input.assigned_by))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| classify_write_error("user_role", e))?;

        let rows: Vec<UserRoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user_role".into(),
            id: id_str,
        })?;

        Ok(UserRole {
            id,
            user_id: parse_uuid("user", &row.user_id)?,
            role_id: parse_uuid("role", &row.role_id)?,
            tenant_id: parse_uuid("tenant", &row.tenant_id)?,
            assigned_by: row.assigned_by,
            assigned_at: row.assigned_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
        })
    }

    async fn find(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Uuid,
    ) -> VerdictResult<Option<UserRole>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE user_id = $user_id \
                 AND role_id = $role_id AND tenant_id = $tenant_id"
            ))
            .bind(("user_id", user_id.to_string()))
            .bind(("role_id", role_id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|r| r.try_into_user_role())
            .transpose()?)
    }

    async fn count_active_for_role(&self, role_id: Uuid) -> VerdictResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM user_role \
                 WHERE role_id = $role_id AND is_active = true GROUP ALL",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn list_active_by_user(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> VerdictResult<Vec<UserRole>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE user_id = $user_id \
                 AND tenant_id = $tenant_id AND is_active = true"
            ))
            .bind(("user_id", user_id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_user_role())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn list_active_by_user_all_tenants(&self, user_id: Uuid) -> VerdictResult<Vec<UserRole>> {
        self.take_assignments(
            format!(
                "{SELECT_WITH_ID} WHERE user_id = $user_id \
                 AND is_active = true"
            ),
            user_id.to_string(),
        )
        .await
    }

    async fn list_active_by_role(
        &self,
        role_id: Uuid,
        tenant_id: Uuid,
    ) -> VerdictResult<Vec<UserRole>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE role_id = $role_id \
                 AND tenant_id = $tenant_id AND is_active = true"
            ))
            .bind(("role_id", role_id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_user_role())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn find_active_bindings(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> VerdictResult<Vec<UserRoleBinding>> {
        // 1. Active, unexpired assignments for the user in the tenant.
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE user_id = $user_id \
                 AND tenant_id = $tenant_id AND is_active = true \
                 AND (expires_at = NONE OR expires_at > time::now())"
            ))
            .bind(("user_id", user_id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let assignment_rows: Vec<UserRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        if assignment_rows.is_empty() {
            return Ok(Vec::new());
        }

        let assignments = assignment_rows
            .into_iter()
            .map(|r| r.try_into_user_role())
            .collect::<Result<Vec<_>, DbError>>()?;

        // 2. The roles behind those assignments, in one batch.
        let role_ids: Vec<String> = assignments
            .iter()
            .map(|a| a.role_id.to_string())
            .collect();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM role \
                 WHERE meta::id(id) IN $role_ids",
            )
            .bind(("role_ids", role_ids.clone()))
            .await
            .map_err(DbError::from)?;

        let role_rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let roles: HashMap<Uuid, Role> = role_rows
            .into_iter()
            .map(|r| r.try_into_role().map(|role| (role.id, role)))
            .collect::<Result<HashMap<_, _>, DbError>>()?;

        // 3. Live grants for all roles, in one batch.
        let grants =
            SurrealRolePermissionRepository::grants_for_roles(&self.db, role_ids).await?;
        let mut grants_by_role: HashMap<Uuid, Vec<_>> = HashMap::new();
        for grant in grants {
            grants_by_role
                .entry(grant.grant.role_id)
                .or_default()
                .push(grant);
        }

        let mut bindings = Vec::new();
        for assignment in assignments {
            // A dangling role reference means the role was hard-deleted
            // under an active assignment; skip rather than fail the check.
            let Some(role) = roles.get(&assignment.role_id) else {
                continue;
            };
            let grants = grants_by_role
                .remove(&assignment.role_id)
                .unwrap_or_default();
            bindings.push(UserRoleBinding {
                assignment,
                role: role.clone(),
                grants,
            });
        }

        Ok(bindings)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> VerdictResult<()> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('user_role', $id) SET \
                 is_active = $is_active",
            )
            .bind(("id", id_str.clone()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRoleRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "user_role".into(),
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
                "SELECT count() AS total FROM user_role \
                 WHERE is_active = true AND expires_at != NONE \
                 AND expires_at < $now GROUP ALL; \
                 UPDATE user_role SET is_active = false \
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
