//! Resource registry service.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::resource::{CreateResource, Resource, UpdateResource};
use verdict_core::repository::{PaginatedResult, Pagination, ResourceRepository};
use verdict_engine::DecisionCache;

pub struct ResourceService<RES> {
    resources: RES,
    cache: Arc<dyn DecisionCache>,
}

impl<RES: ResourceRepository> ResourceService<RES> {
    pub fn new(resources: RES, cache: Arc<dyn DecisionCache>) -> Self {
        Self { resources, cache }
    }

    pub async fn create(&self, input: CreateResource) -> VerdictResult<Resource> {
        validate_identifier(&input.resource_identifier)?;
        info!(
            identifier = %input.resource_identifier,
            tenant_id = %input.tenant_id,
            "Registering resource"
        );

        if self
            .resources
            .exists_by_identifier(&input.resource_identifier)
            .await?
        {
            return Err(VerdictError::Duplicate {
                entity: format!("resource '{}'", input.resource_identifier),
            });
        }

        if let Some(parent_id) = input.parent_resource_id {
            let parent = self.resources.get_by_id(parent_id).await?;
            if parent.tenant_id != input.tenant_id {
                return Err(VerdictError::TenantIsolation {
                    message: "Parent resource belongs to a different tenant".into(),
                });
            }
        }

        let resource = self.resources.create(input).await?;
        info!(resource_id = %resource.id, "Resource registered");
        Ok(resource)
    }

    pub async fn get(&self, id: Uuid) -> VerdictResult<Resource> {
        self.resources.get_by_id(id).await
    }

    pub async fn get_by_identifier(&self, identifier: &str) -> VerdictResult<Resource> {
        self.resources.get_by_identifier(identifier).await
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> VerdictResult<PaginatedResult<Resource>> {
        self.resources.list_by_tenant(tenant_id, pagination).await
    }

    pub async fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdateResource,
    ) -> VerdictResult<Resource> {
        if let Some(Some(parent_id)) = input.parent_resource_id {
            let resource = self.resources.get_by_id(id).await?;
            let parent = self.resources.get_by_id(parent_id).await?;
            if parent.tenant_id != resource.tenant_id {
                return Err(VerdictError::TenantIsolation {
                    message: "Parent resource belongs to a different tenant".into(),
                });
            }
            if parent_id == id {
                return Err(VerdictError::Validation {
                    message: "A resource cannot be its own parent".into(),
                });
            }
        }

        let updated = self.resources.update(id, expected_version, input).await?;
        self.cache.invalidate_all().await;
        Ok(updated)
    }

    /// Delete a resource. Refused while child resources exist.
    pub async fn delete(&self, id: Uuid) -> VerdictResult<()> {
        let children = self.resources.find_children(id).await?;
        if !children.is_empty() {
            return Err(VerdictError::BusinessRule {
                message: format!(
                    "Cannot delete resource: it has {} child resources",
                    children.len()
                ),
            });
        }

        self.resources.delete(id).await?;
        self.cache.invalidate_all().await;
        info!(resource_id = %id, "Resource deleted");
        Ok(())
    }

    pub async fn children(&self, id: Uuid) -> VerdictResult<Vec<Resource>> {
        self.resources.find_children(id).await
    }

    pub async fn attach_policy(&self, resource_id: Uuid, policy_id: Uuid) -> VerdictResult<()> {
        self.resources.get_by_id(resource_id).await?;
        self.resources.attach_policy(resource_id, policy_id).await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    pub async fn detach_policy(&self, resource_id: Uuid, policy_id: Uuid) -> VerdictResult<()> {
        self.resources.detach_policy(resource_id, policy_id).await?;
        self.cache.invalidate_all().await;
        Ok(())
    }
}

fn validate_identifier(identifier: &str) -> VerdictResult<()> {
    if identifier.is_empty() || identifier.len() > 255 {
        return Err(VerdictError::Validation {
            message: "Resource identifier must be 1-255 characters".into(),
        });
    }
    Ok(())
}
