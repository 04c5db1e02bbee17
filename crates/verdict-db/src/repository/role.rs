//! SurrealDB implementation of [`RoleRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use verdict_core::error::VerdictResult;
use verdict_core::models::role::{CreateRole, Role, UpdateRole};
use verdict_core::repository::{PaginatedResult, Pagination, RoleRepository};

use crate::error::{DbError, classify_write_error};
use crate::repository::{parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct RoleRow {
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

impl RoleRow {
    fn into_role(self, id: Uuid) -> Result<Role, DbError> {
        Ok(Role {
            id,
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

impl RoleRowWithId {
    fn try_into_role(self) -> Result<Role, DbError> {
        let id = parse_uuid("role", &self.record_id)?;
        RoleRow {
            tenant_id: self.tenant_id,
            name: self.name,
            description: self.description,
            priority: self.priority,
            max_users: self.max_users,
            is_system: self.is_system,
            is_active: self.is_active,
            parent_role_id: self.parent_role_id,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
        .into_role(id)
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

const SELECT_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM role";

/// SurrealDB implementation of the Role repository.
#[derive(Clone)]
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

fn rows_into_roles(rows: Vec<RoleRowWithId>) -> Result<Vec<Role>, DbError> {
    rows.into_iter().map(|r| r.try_into_role()).collect()
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> VerdictResult<Role> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('role', $id) SET \
                 tenant_id = $tenant_id, name = $name, \
                 description = $description, priority = $priority, \
                 max_users = $max_users, is_system = $is_system, \
                 is_active = true, parent_role_id = $parent_role_id, \
                 created_by = $created_by, updated_by = NONE, \
                 version = 0",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("priority", input.priority))
            .bind(("max_users", input.max_users))
            .bind(("is_system", input.is_system))
            .bind((
                "parent_role_id",
                input.parent_role_id.map(|p| p.to_string()),
            ))
            .bind(("created_by", input.created_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| classify_write_error("role", e))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?;

        Ok(row.into_role(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> VerdictResult<Role> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('role', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?;

        Ok(row.into_role(id)?)
    }

    async fn get_by_name(&self, tenant_id: Option<Uuid>, name: &str) -> VerdictResult<Role> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE name = $name AND tenant_id = $tenant_id"
            ))
            .bind(("name", name.to_string()))
            .bind(("tenant_id", tenant_id.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: name.to_string(),
        })?;

        Ok(row.try_into_role()?)
    }

    async fn exists_by_name(&self, tenant_id: Option<Uuid>, name: &str) -> VerdictResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM role \
                 WHERE name = $name AND tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("name", name.to_string()))
            .bind(("tenant_id", tenant_id.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdateRole,
    ) -> VerdictResult<Role> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.priority.is_some() {
            sets.push("priority = $priority");
        }
        if input.max_users.is_some() {
            sets.push("max_users = $max_users");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.updated_by.is_some() {
            sets.push("updated_by = $updated_by");
        }
        sets.push("updated_at = time::now()");
        sets.push("version = version + 1");

        let query = format!(
            "UPDATE type::record('role', $id) SET {} \
             WHERE version = $expected_version",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("expected_version", expected_version));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(priority) = input.priority {
            builder = builder.bind(("priority", priority));
        }
        if let Some(max_users) = input.max_users {
            builder = builder.bind(("max_users", max_users));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(updated_by) = input.updated_by {
            builder = builder.bind(("updated_by", updated_by));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| classify_write_error("role", e))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_role(id)?),
            // Empty result: either the record is missing or the version
            // check failed. Fetch once to tell the two apart.
            None => {
                self.get_by_id(id).await?;
                Err(DbError::Conflict {
                    entity: "role".into(),
                }
                .into())
            }
        }
    }

    async fn delete(&self, id: Uuid) -> VerdictResult<()> {
        let id_str = id.to_string();

        // Grants go first, then the role record itself.
        self.db
            .query(
                "DELETE role_permission WHERE role_id = $id; \
                 DELETE type::record('role', $id);",
            )
            .bind(("id", id_str))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> VerdictResult<PaginatedResult<Role>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM role \
                 WHERE tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("tenant_id", tenant_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE tenant_id = $tenant_id \
                 ORDER BY priority DESC \
                 LIMIT $limit START $offset"
            ))
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_role())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_active_by_tenant(&self, tenant_id: Uuid) -> VerdictResult<Vec<Role>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE tenant_id = $tenant_id \
                 AND is_active = true ORDER BY priority DESC"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_roles(rows)?)
    }

    async fn list_system_by_tenant(&self, tenant_id: Uuid) -> VerdictResult<Vec<Role>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE tenant_id = $tenant_id \
                 AND is_system = true ORDER BY priority DESC"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_roles(rows)?)
    }

    async fn find_children(&self, role_id: Uuid) -> VerdictResult<Vec<Role>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE parent_role_id = $parent_id"
            ))
            .bind(("parent_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_roles(rows)?)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> VerdictResult<()> {
        self.db
            .query(
                "UPDATE type::record('role', $id) SET \
                 is_active = $is_active, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> VerdictResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM role \
                 WHERE tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
