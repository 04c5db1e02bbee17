//! SurrealDB implementation of [`ResourceRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use verdict_core::error::VerdictResult;
use verdict_core::models::policy::ResourceWithPolicies;
use verdict_core::models::resource::{CreateResource, Resource, UpdateResource};
use verdict_core::repository::{PaginatedResult, Pagination, ResourceRepository};

use crate::error::{DbError, classify_write_error};
use crate::repository::policy::SurrealPolicyRepository;
use crate::repository::{parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct ResourceRow {
    tenant_id: String,
    resource_identifier: String,
    resource_type: String,
    name: String,
    parent_resource_id: Option<String>,
    attributes: serde_json::Value,
    owner_id: Option<String>,
    is_public: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, SurrealValue)]
struct ResourceRowWithId {
    record_id: String,
    tenant_id: String,
    resource_identifier: String,
    resource_type: String,
    name: String,
    parent_resource_id: Option<String>,
    attributes: serde_json::Value,
    owner_id: Option<String>,
    is_public: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

impl ResourceRow {
    fn into_resource(self, id: Uuid) -> Result<Resource, DbError> {
        Ok(Resource {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            resource_identifier: self.resource_identifier,
            resource_type: self.resource_type,
            name: self.name,
            parent_resource_id: parse_opt_uuid("parent resource", self.parent_resource_id)?,
            attributes: self.attributes,
            owner_id: parse_opt_uuid("owner", self.owner_id)?,
            is_public: self.is_public,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

impl ResourceRowWithId {
    fn try_into_resource(self) -> Result<Resource, DbError> {
        let id = parse_uuid("resource", &self.record_id)?;
        ResourceRow {
            tenant_id: self.tenant_id,
            resource_identifier: self.resource_identifier,
            resource_type: self.resource_type,
            name: self.name,
            parent_resource_id: self.parent_resource_id,
            attributes: self.attributes,
            owner_id: self.owner_id,
            is_public: self.is_public,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
        .into_resource(id)
    }
}

const SELECT_WITH_ID: &str = "SELECT meta::id(id) AS record_id, * FROM resource";

/// SurrealDB implementation of the Resource repository.
#[derive(Clone)]
pub struct SurrealResourceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealResourceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ResourceRepository for SurrealResourceRepository<C> {
    async fn create(&self, input: CreateResource) -> VerdictResult<Resource> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let attributes = input.attributes.unwrap_or_else(|| serde_json::json!({}));

        let result = self
            .db
            .query(
                "CREATE type::record('resource', $id) SET \
                 tenant_id = $tenant_id, \
                 resource_identifier = $resource_identifier, \
                 resource_type = $resource_type, name = $name, \
                 parent_resource_id = $parent_resource_id, \
                 attributes = $attributes, owner_id = $owner_id, \
                 is_public = $is_public, is_active = true, version = 0",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("resource_identifier", input.resource_identifier))
            .bind(("resource_type", input.resource_type))
            .bind(("name", input.name))
            .bind((
                "parent_resource_id",
                input.parent_resource_id.map(|p| p.to_string()),
            ))
            .bind(("attributes", attributes))
            .bind(("owner_id", input.owner_id.map(|o| o.to_string())))
            .bind(("is_public", input.is_public))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| classify_write_error("resource", e))?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "resource".into(),
            id: id_str,
        })?;

        Ok(row.into_resource(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> VerdictResult<Resource> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('resource', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "resource".into(),
            id: id_str,
        })?;

        Ok(row.into_resource(id)?)
    }

    async fn get_by_identifier(&self, identifier: &str) -> VerdictResult<Resource> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE resource_identifier = $identifier"
            ))
            .bind(("identifier", identifier.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "resource".into(),
            id: identifier.to_string(),
        })?;

        Ok(row.try_into_resource()?)
    }

    async fn get_by_identifier_with_policies(
        &self,
        identifier: &str,
    ) -> VerdictResult<Option<ResourceWithPolicies>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE resource_identifier = $identifier"
            ))
            .bind(("identifier", identifier.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRowWithId> = result.take(0).map_err(DbError::from)?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let resource = row.try_into_resource()?;
        let policies = SurrealPolicyRepository::bundles_for_resource(
            &self.db,
            resource.id.to_string(),
        )
        .await?;

        Ok(Some(ResourceWithPolicies { resource, policies }))
    }

    async fn exists_by_identifier(&self, identifier: &str) -> VerdictResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM resource \
                 WHERE resource_identifier = $identifier GROUP ALL",
            )
            .bind(("identifier", identifier.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdateResource,
    ) -> VerdictResult<Resource> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.parent_resource_id.is_some() {
            sets.push("parent_resource_id = $parent_resource_id");
        }
        if input.attributes.is_some() {
            sets.push("attributes = $attributes");
        }
        if input.owner_id.is_some() {
            sets.push("owner_id = $owner_id");
        }
        if input.is_public.is_some() {
            sets.push("is_public = $is_public");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");
        sets.push("version = version + 1");

        let query = format!(
            "UPDATE type::record('resource', $id) SET {} \
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
        if let Some(parent_resource_id) = input.parent_resource_id {
            builder = builder.bind((
                "parent_resource_id",
                parent_resource_id.map(|p| p.to_string()),
            ));
        }
        if let Some(attributes) = input.attributes {
            builder = builder.bind(("attributes", attributes));
        }
        if let Some(owner_id) = input.owner_id {
            builder = builder.bind(("owner_id", owner_id.map(|o| o.to_string())));
        }
        if let Some(is_public) = input.is_public {
            builder = builder.bind(("is_public", is_public));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| classify_write_error("resource", e))?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_resource(id)?),
            None => {
                self.get_by_id(id).await?;
                Err(DbError::Conflict {
                    entity: "resource".into(),
                }
                .into())
            }
        }
    }

    async fn delete(&self, id: Uuid) -> VerdictResult<()> {
        self.db
            .query(
                "DELETE resource_policy WHERE resource_id = $id; \
                 DELETE type::record('resource', $id);",
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
    ) -> VerdictResult<PaginatedResult<Resource>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM resource \
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
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset"
            ))
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|r| r.try_into_resource())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn find_children(&self, resource_id: Uuid) -> VerdictResult<Vec<Resource>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_WITH_ID} WHERE parent_resource_id = $parent_id"
            ))
            .bind(("parent_id", resource_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| r.try_into_resource())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn attach_policy(&self, resource_id: Uuid, policy_id: Uuid) -> VerdictResult<()> {
        let result = self
            .db
            .query(
                "CREATE resource_policy SET resource_id = $resource_id, \
                 policy_id = $policy_id",
            )
            .bind(("resource_id", resource_id.to_string()))
            .bind(("policy_id", policy_id.to_string()))
            .await
            .map_err(DbError::from)?;

        // An existing link is fine: attaching is idempotent.
        if let Err(e) = result.check() {
            let classified = classify_write_error("resource_policy", e);
            if !matches!(classified, DbError::Duplicate { .. }) {
                return Err(classified.into());
            }
        }

        Ok(())
    }

    async fn detach_policy(&self, resource_id: Uuid, policy_id: Uuid) -> VerdictResult<()> {
        self.db
            .query(
                "DELETE resource_policy WHERE resource_id = $resource_id \
                 AND policy_id = $policy_id",
            )
            .bind(("resource_id", resource_id.to_string()))
            .bind(("policy_id", policy_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }
}
