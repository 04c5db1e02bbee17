//! SurrealDB implementation of [`PermissionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::permission::{CreatePermission, Permission, RiskLevel, UpdatePermission};
use verdict_core::repository::{PaginatedResult, Pagination, PermissionFilter, PermissionRepository};

use crate::error::{DbError, classify_write_error};
use crate::repository::parse_uuid;

#[derive(Debug, SurrealValue)]
struct PermissionRow {
    resource_type: String,
    action: String,
    description: String,
    risk_level: String,
    requires_mfa: bool,
    requires_approval: bool,
    is_system: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, SurrealValue)]
pub(crate) struct PermissionRowWithId {
    record_id: String,
    resource_type: String,
    action: String,
    description: String,
    risk_level: String,
    requires_mfa: bool,
    requires_approval: bool,
    is_system: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_risk_level(s: &str) -> Result<RiskLevel, DbError> {
    match s {
        "Low" => Ok(RiskLevel::Low),
        "Medium" => Ok(RiskLevel::Medium),
        "High" => Ok(RiskLevel::High),
        "Critical" => Ok(RiskLevel::Critical),
        other => Err(DbError::Migration(format!("unknown risk level: {other}"))),
    }
}

fn risk_level_to_string(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Low",
        RiskLevel::Medium => "Medium",
        RiskLevel::High => "High",
        RiskLevel::Critical => "Critical",
    }
}

impl PermissionRow {
    fn into_permission(self, id: Uuid) -> Result<Permission, DbError> {
        Ok(Permission {
            id,
            resource_type: self.resource_type,
            action: self.action,
            description: self.description,
            risk_level: parse_risk_level(&self.risk_level)?,
            requires_mfa: self.requires_mfa,
            requires_approval: self.requires_approval,
            is_system: self.is_system,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

impl PermissionRowWithId {
    fn try_into_permission(self) -> Result<Permission, DbError> {
        let id = parse_uuid("permission", &self.record_id)?;
        PermissionRow {
            resource_type: self.resource_type,
            action: self.action,
            description: self.description,
            risk_level: self.risk_level,
            requires_mfa: self.requires_mfa,
            requires_approval: self.requires_approval,
            is_system: self.is_system,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
        .into_permission(id)
    }
}

pub(crate) fn rows_into_permissions(
    rows: Vec<PermissionRowWithId>,
) -> Result<Vec<Permission>, DbError> {
    rows.into_iter().map(|r| r.try_into_permission()).collect()
}

const SELECT_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM permission";

/// SurrealDB implementation of the Permission repository.
#[derive(Clone)]
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn create(&self, input: CreatePermission) -> VerdictResult<Permission> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('permission', $id) SET \
                 resource_type = $resource_type, action = $action, \
                 description = $description, risk_level = $risk_level, \
                 requires_mfa = $requires_mfa, \
                 requires_approval = $requires_approval, \
                 is_system = $is_system, is_active = true, version = 0",
            )
            .bind(("id", id_str.clone()))
            .bind(("resource_type", input.resource_type))
            .bind(("action", input.action))
            .bind(("description", input.description))
            .bind(("risk_level", risk_level_to_string(input.risk_level).to_string()))
            .bind(("requires_mfa", input.requires_mfa))
            .bind(("requires_approval", input.requires_approval))
            .bind(("is_system", input.is_system))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| classify_write_error("permission", e))?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id_str,
        })?;

        Ok(row.into_permission(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> VerdictResult<Permission> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('permission', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id_str,
        })?;

        Ok(row.into_permission(id)?)
    }

    async fn get_by_type_and_action(
        &self,
        resource_type: &str,
        action: &str,
    ) -> VerdictResult<Permission> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE resource_type = $resource_type \
                 AND action = $action"
            ))
            .bind(("resource_type", resource_type.to_string()))
            .bind(("action", action.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: format!("{resource_type}:{action}"),
        })?;

        Ok(row.try_into_permission()?)
    }

    async fn find_or_create(&self, input: CreatePermission) -> VerdictResult<Permission> {
        match self
            .get_by_type_and_action(&input.resource_type, &input.action)
            .await
        {
            Ok(existing) => Ok(existing),
            Err(VerdictError::NotFound { .. }) => match self.create(input.clone()).await {
                Ok(created) => Ok(created),
                // A concurrent seeder won the unique-index race.
                Err(VerdictError::Duplicate { .. }) => {
                    self.get_by_type_and_action(&input.resource_type, &input.action)
                        .await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdatePermission,
    ) -> VerdictResult<Permission> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.risk_level.is_some() {
            sets.push("risk_level = $risk_level");
        }
        if input.requires_mfa.is_some() {
            sets.push("requires_mfa = $requires_mfa");
        }
        if input.requires_approval.is_some() {
            sets.push("requires_approval = $requires_approval");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");
        sets.push("version = version + 1");

        let query = format!(
            "UPDATE type::record('permission', $id) SET {} \
             WHERE version = $expected_version",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("expected_version", expected_version));

        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(risk_level) = input.risk_level {
            builder = builder.bind(("risk_level", risk_level_to_string(risk_level).to_string()));
        }
        if let Some(requires_mfa) = input.requires_mfa {
            builder = builder.bind(("requires_mfa", requires_mfa));
        }
        if let Some(requires_approval) = input.requires_approval {
            builder = builder.bind(("requires_approval", requires_approval));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| classify_write_error("permission", e))?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_permission(id)?),
            None => {
                self.get_by_id(id).await?;
                Err(DbError::Conflict {
                    entity: "permission".into(),
                }
                .into())
            }
        }
    }

    async fn delete(&self, id: Uuid) -> VerdictResult<()> {
        self.db
            .query(
                "DELETE role_permission WHERE permission_id = $id; \
                 DELETE policy_permission WHERE permission_id = $id; \
                 DELETE type::record('permission', $id);",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn list(
        &self,
        filter: PermissionFilter,
        pagination: Pagination,
    ) -> VerdictResult<PaginatedResult<Permission>> {
        let mut clauses = Vec::new();
        if filter.resource_type.is_some() {
            clauses.push("resource_type = $resource_type");
        }
        if filter.action.is_some() {
            clauses.push("action = $action");
        }
        if filter.is_active.is_some() {
            clauses.push("is_active = $is_active");
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let count_query = format!(
            "SELECT count() AS total FROM permission{where_clause} GROUP ALL"
        );
        let list_query = format!(
            "{SELECT_WITH_ID}{where_clause} \
             ORDER BY resource_type ASC, action ASC \
             LIMIT $limit START $offset"
        );

        let mut count_builder = self.db.query(&count_query);
        let mut list_builder = self
            .db
            .query(&list_query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));

        if let Some(resource_type) = filter.resource_type {
            count_builder = count_builder.bind(("resource_type", resource_type.clone()));
            list_builder = list_builder.bind(("resource_type", resource_type));
        }
        if let Some(action) = filter.action {
            count_builder = count_builder.bind(("action", action.clone()));
            list_builder = list_builder.bind(("action", action));
        }
        if let Some(is_active) = filter.is_active {
            count_builder = count_builder.bind(("is_active", is_active));
            list_builder = list_builder.bind(("is_active", is_active));
        }

        let mut count_result = count_builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = list_builder.await.map_err(DbError::from)?;
        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows_into_permissions(rows)?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_by_resource_types(
        &self,
        resource_types: &[String],
    ) -> VerdictResult<Vec<Permission>> {
        if resource_types.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE resource_type IN $resource_types \
                 AND is_active = true"
            ))
            .bind(("resource_types", resource_types.to_vec()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_permissions(rows)?)
    }

    async fn distinct_resource_types(&self) -> VerdictResult<Vec<String>> {
        let mut result = self
            .db
            .query(
                "SELECT VALUE resource_type FROM permission \
                 WHERE is_active = true",
            )
            .await
            .map_err(DbError::from)?;

        let mut values: Vec<String> = result.take(0).map_err(DbError::from)?;
        values.sort_unstable();
        values.dedup();
        Ok(values)
    }

    async fn distinct_actions(&self) -> VerdictResult<Vec<String>> {
        let mut result = self
            .db
            .query(
                "SELECT VALUE action FROM permission \
                 WHERE is_active = true",
            )
            .await
            .map_err(DbError::from)?;

        let mut values: Vec<String> = result.take(0).map_err(DbError::from)?;
        values.sort_unstable();
        values.dedup();
        Ok(values)
    }
}
