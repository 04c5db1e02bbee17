//! SurrealDB implementation of [`PolicyRepository`].
//!
//! Policies are loaded as [`PolicyBundle`]s (the policy row joined with
//! its referenced permissions and resources) so the evaluator never
//! touches storage.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use verdict_core::error::VerdictResult;
use verdict_core::models::policy::{
    CreatePolicy, Policy, PolicyBundle, PolicyEffect, PolicyResourceRef, PolicyType, UpdatePolicy,
};
use verdict_core::repository::{PaginatedResult, Pagination, PolicyRepository};

use crate::error::{DbError, classify_write_error};
use crate::repository::permission::{PermissionRowWithId, rows_into_permissions};
use crate::repository::{parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct PolicyRow {
    tenant_id: Option<String>,
    name: String,
    description: String,
    policy_type: String,
    effect: String,
    conditions: serde_json::Value,
    priority: i32,
    is_active: bool,
    is_system: bool,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    created_by: String,
    updated_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, SurrealValue)]
struct PolicyRowWithId {
    record_id: String,
    tenant_id: Option<String>,
    name: String,
    description: String,
    policy_type: String,
    effect: String,
    conditions: serde_json::Value,
    priority: i32,
    is_active: bool,
    is_system: bool,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    created_by: String,
    updated_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, SurrealValue)]
struct LinkRow {
    policy_id: String,
    permission_id: String,
}

#[derive(Debug, SurrealValue)]
struct ResourceLinkRow {
    resource_id: String,
    policy_id: String,
}

#[derive(Debug, SurrealValue)]
struct ResourceRefRow {
    record_id: String,
    resource_identifier: String,
    resource_type: String,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_policy_type(s: &str) -> Result<PolicyType, DbError> {
    match s {
        "ResourceBased" => Ok(PolicyType::ResourceBased),
        "IdentityBased" => Ok(PolicyType::IdentityBased),
        "AttributeBased" => Ok(PolicyType::AttributeBased),
        "TimeBased" => Ok(PolicyType::TimeBased),
        "Conditional" => Ok(PolicyType::Conditional),
        other => Err(DbError::Migration(format!("unknown policy type: {other}"))),
    }
}

fn policy_type_to_string(t: PolicyType) -> &'static str {
    match t {
        PolicyType::ResourceBased => "ResourceBased",
        PolicyType::IdentityBased => "IdentityBased",
        PolicyType::AttributeBased => "AttributeBased",
        PolicyType::TimeBased => "TimeBased",
        PolicyType::Conditional => "Conditional",
    }
}

fn parse_effect(s: &str) -> Result<PolicyEffect, DbError> {
    match s {
        "Allow" => Ok(PolicyEffect::Allow),
        "Deny" => Ok(PolicyEffect::Deny),
        other => Err(DbError::Migration(format!("unknown policy effect: {other}"))),
    }
}

fn effect_to_string(e: PolicyEffect) -> &'static str {
    match e {
        PolicyEffect::Allow => "Allow",
        PolicyEffect::Deny => "Deny",
    }
}

impl PolicyRow {
    fn into_policy(self, id: Uuid) -> Result<Policy, DbError> {
        Ok(Policy {
            id,
            tenant_id: parse_opt_uuid("tenant", self.tenant_id)?,
            name: self.name,
            description: self.description,
            policy_type: parse_policy_type(&self.policy_type)?,
            effect: parse_effect(&self.effect)?,
            conditions: self.conditions,
            priority: self.priority,
            is_active: self.is_active,
            is_system: self.is_system,
            start_date: self.start_date,
            end_date: self.end_date,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

impl PolicyRowWithId {
    fn try_into_policy(self) -> Result<Policy, DbError> {
        let id = parse_uuid("policy", &self.record_id)?;
        PolicyRow {
            tenant_id: self.tenant_id,
            name: self.name,
            description: self.description,
            policy_type: self.policy_type,
            effect: self.effect,
            conditions: self.conditions,
            priority: self.priority,
            is_active: self.is_active,
            is_system: self.is_system,
            start_date: self.start_date,
            end_date: self.end_date,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
        .into_policy(id)
    }
}

const SELECT_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM policy";

/// SurrealDB implementation of the Policy repository.
#[derive(Clone)]
pub struct SurrealPolicyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPolicyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Assembles bundles for the given policies, preserving their order.
    pub(crate) async fn assemble_bundles(
        db: &Surreal<C>,
        policies: Vec<Policy>,
    ) -> Result<Vec<PolicyBundle>, DbError> {
        if policies.is_empty() {
            return Ok(Vec::new());
        }

        let policy_ids: Vec<String> = policies.iter().map(|p| p.id.to_string()).collect();

        // Referenced permissions.
        let mut result = db
            .query("SELECT * FROM policy_permission WHERE policy_id IN $policy_ids")
            .bind(("policy_ids", policy_ids.clone()))
            .await
            .map_err(DbError::from)?;
        let permission_links: Vec<LinkRow> = result.take(0).map_err(DbError::from)?;

        let permission_ids: Vec<String> = permission_links
            .iter()
            .map(|l| l.permission_id.clone())
            .collect();
        let permissions = if permission_ids.is_empty() {
            HashMap::new()
        } else {
            let mut result = db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM permission \
                     WHERE meta::id(id) IN $ids",
                )
                .bind(("ids", permission_ids))
                .await
                .map_err(DbError::from)?;
            let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
            rows_into_permissions(rows)?
                .into_iter()
                .map(|p| (p.id.to_string(), p))
                .collect()
        };

        // Attached resources.
        let mut result = db
            .query("SELECT * FROM resource_policy WHERE policy_id IN $policy_ids")
            .bind(("policy_ids", policy_ids))
            .await
            .map_err(DbError::from)?;
        let resource_links: Vec<ResourceLinkRow> = result.take(0).map_err(DbError::from)?;

        let resource_ids: Vec<String> = resource_links
            .iter()
            .map(|l| l.resource_id.clone())
            .collect();
        let resource_refs: HashMap<String, PolicyResourceRef> = if resource_ids.is_empty() {
            HashMap::new()
        } else {
            let mut result = db
                .query(
                    "SELECT meta::id(id) AS record_id, resource_identifier, \
                     resource_type FROM resource WHERE meta::id(id) IN $ids",
                )
                .bind(("ids", resource_ids))
                .await
                .map_err(DbError::from)?;
            let rows: Vec<ResourceRefRow> = result.take(0).map_err(DbError::from)?;
            rows.into_iter()
                .map(|r| {
                    let id = parse_uuid("resource", &r.record_id)?;
                    Ok((
                        r.record_id,
                        PolicyResourceRef {
                            resource_id: id,
                            resource_identifier: r.resource_identifier,
                            resource_type: r.resource_type,
                        },
                    ))
                })
                .collect::<Result<HashMap<_, _>, DbError>>()?
        };

        let mut permissions_by_policy: HashMap<String, Vec<_>> = HashMap::new();
        for link in permission_links {
            if let Some(permission) = permissions.get(&link.permission_id) {
                permissions_by_policy
                    .entry(link.policy_id)
                    .or_default()
                    .push(permission.clone());
            }
        }

        let mut resources_by_policy: HashMap<String, Vec<_>> = HashMap::new();
        for link in resource_links {
            if let Some(resource) = resource_refs.get(&link.resource_id) {
                resources_by_policy
                    .entry(link.policy_id)
                    .or_default()
                    .push(resource.clone());
            }
        }

        Ok(policies
            .into_iter()
            .map(|policy| {
                let key = policy.id.to_string();
                PolicyBundle {
                    permissions: permissions_by_policy.remove(&key).unwrap_or_default(),
                    resources: resources_by_policy.remove(&key).unwrap_or_default(),
                    policy,
                }
            })
            .collect())
    }

    /// Loads the policies attached to a resource (via `resource_policy`)
    /// as bundles ordered by priority descending.
    pub(crate) async fn bundles_for_resource(
        db: &Surreal<C>,
        resource_id: String,
    ) -> Result<Vec<PolicyBundle>, DbError> {
        let mut result = db
            .query("SELECT * FROM resource_policy WHERE resource_id = $resource_id")
            .bind(("resource_id", resource_id))
            .await
            .map_err(DbError::from)?;
        let links: Vec<ResourceLinkRow> = result.take(0).map_err(DbError::from)?;
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let policy_ids: Vec<String> = links.into_iter().map(|l| l.policy_id).collect();
        let mut result = db
            .query(format!(
                "{SELECT_WITH_ID} WHERE meta::id(id) IN $ids \
                 ORDER BY priority DESC"
            ))
            .bind(("ids", policy_ids))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<PolicyRowWithId> = result.take(0).map_err(DbError::from)?;
        let policies = rows
            .into_iter()
            .map(|r| r.try_into_policy())
            .collect::<Result<Vec<_>, DbError>>()?;

        Self::assemble_bundles(db, policies).await
    }
}

impl<C: Connection> PolicyRepository for SurrealPolicyRepository<C> {
    async fn create(&self, input: CreatePolicy) -> VerdictResult<Policy> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let conditions = input.conditions.unwrap_or_else(|| serde_json::json!({}));

        let result = self
            .db
            .query(
                "CREATE type::record('policy', $id) SET \
                 tenant_id = $tenant_id, name = $name, \
                 description = $description, policy_type = $policy_type, \
                 effect = $effect, conditions = $conditions, \
                 priority = $priority, is_active = true, \
                 is_system = false, start_date = $start_date, \
                 end_date = $end_date, created_by = $created_by, \
                 updated_by = NONE, version = 0",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("policy_type", policy_type_to_string(input.policy_type).to_string()))
            .bind(("effect", effect_to_string(input.effect).to_string()))
            .bind(("conditions", conditions))
            .bind(("priority", input.priority))
            .bind(("start_date", input.start_date))
            .bind(("end_date", input.end_date))
            .bind(("created_by", input.created_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| classify_write_error("policy", e))?;

        let rows: Vec<PolicyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "policy".into(),
            id: id_str,
        })?;

        let policy = row.into_policy(id)?;

        // Link referenced permissions.
        for permission_id in input.permission_ids {
            self.add_permission(id, permission_id).await?;
        }

        Ok(policy)
    }

    async fn get_by_id(&self, id: Uuid) -> VerdictResult<Policy> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('policy', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PolicyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "policy".into(),
            id: id_str,
        })?;

        Ok(row.into_policy(id)?)
    }

    async fn get_bundle(&self, id: Uuid) -> VerdictResult<PolicyBundle> {
        let policy = self.get_by_id(id).await?;
        let mut bundles = Self::assemble_bundles(&self.db, vec![policy]).await?;
        Ok(bundles.remove(0))
    }

    async fn exists_by_name(&self, tenant_id: Option<Uuid>, name: &str) -> VerdictResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM policy \
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
        input: UpdatePolicy,
    ) -> VerdictResult<Policy> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.effect.is_some() {
            sets.push("effect = $effect");
        }
        if input.conditions.is_some() {
            sets.push("conditions = $conditions");
        }
        if input.priority.is_some() {
            sets.push("priority = $priority");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.start_date.is_some() {
            sets.push("start_date = $start_date");
        }
        if input.end_date.is_some() {
            sets.push("end_date = $end_date");
        }
        if input.updated_by.is_some() {
            sets.push("updated_by = $updated_by");
        }
        sets.push("updated_at = time::now()");
        sets.push("version = version + 1");

        let query = format!(
            "UPDATE type::record('policy', $id) SET {} \
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
        if let Some(effect) = input.effect {
            builder = builder.bind(("effect", effect_to_string(effect).to_string()));
        }
        if let Some(conditions) = input.conditions {
            builder = builder.bind(("conditions", conditions));
        }
        if let Some(priority) = input.priority {
            builder = builder.bind(("priority", priority));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(start_date) = input.start_date {
            builder = builder.bind(("start_date", start_date));
        }
        if let Some(end_date) = input.end_date {
            builder = builder.bind(("end_date", end_date));
        }
        if let Some(updated_by) = input.updated_by {
            builder = builder.bind(("updated_by", updated_by));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| classify_write_error("policy", e))?;

        let rows: Vec<PolicyRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_policy(id)?),
            None => {
                self.get_by_id(id).await?;
                Err(DbError::Conflict {
                    entity: "policy".into(),
                }
                .into())
            }
        }
    }

    async fn delete(&self, id: Uuid) -> VerdictResult<()> {
        self.db
            .query(
                "DELETE policy_permission WHERE policy_id = $id; \
                 DELETE resource_policy WHERE policy_id = $id; \
                 DELETE type::record('policy', $id);",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> VerdictResult<PaginatedResult<Policy>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM policy \
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

        let rows: Vec<PolicyRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|r| r.try_into_policy())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn find_active_for_tenant(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> VerdictResult<Vec<PolicyBundle>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE tenant_id = $tenant_id \
                 AND is_active = true \
                 AND (start_date = NONE OR start_date <= $now) \
                 AND (end_date = NONE OR end_date >= $now) \
                 ORDER BY priority DESC"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PolicyRowWithId> = result.take(0).map_err(DbError::from)?;
        let policies = rows
            .into_iter()
            .map(|r| r.try_into_policy())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(Self::assemble_bundles(&self.db, policies).await?)
    }

    async fn add_permission(&self, policy_id: Uuid, permission_id: Uuid) -> VerdictResult<()> {
        let result = self
            .db
            .query(
                "CREATE policy_permission SET policy_id = $policy_id, \
                 permission_id = $permission_id",
            )
            .bind(("policy_id", policy_id.to_string()))
            .bind(("permission_id", permission_id.to_string()))
            .await
            .map_err(DbError::from)?;

        // An existing link is fine: linking is idempotent.
        if let Err(e) = result.check() {
            let classified = classify_write_error("policy_permission", e);
            if !matches!(classified, DbError::Duplicate { .. }) {
                return Err(classified.into());
            }
        }

        Ok(())
    }

    async fn remove_permission(&self, policy_id: Uuid, permission_id: Uuid) -> VerdictResult<()> {
        self.db
            .query(
                "DELETE policy_permission WHERE policy_id = $policy_id \
                 AND permission_id = $permission_id",
            )
            .bind(("policy_id", policy_id.to_string()))
            .bind(("permission_id", permission_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> VerdictResult<()> {
        self.db
            .query(
                "UPDATE type::record('policy', $id) SET \
                 is_active = $is_active, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> VerdictResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM policy \
                 WHERE is_active = true AND end_date != NONE \
                 AND end_date < $now GROUP ALL; \
                 UPDATE policy SET is_active = false \
                 WHERE is_active = true AND end_date != NONE \
                 AND end_date < $now;",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
