//! Permission catalog service.
//!
//! Permissions are a global catalog keyed on `(resource_type, action)`.
//! The distinct resource-type and action enumerations are cached in
//! process because they change only on catalog mutations.

use std::sync::Arc;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::permission::{CreatePermission, Permission, UpdatePermission};
use verdict_core::repository::{
    PaginatedResult, Pagination, PermissionFilter, PermissionRepository,
};
use verdict_engine::DecisionCache;

#[derive(Default)]
struct EnumerationCache {
    resource_types: Option<Vec<String>>,
    actions: Option<Vec<String>>,
}

pub struct PermissionService<P> {
    permissions: P,
    cache: Arc<dyn DecisionCache>,
    enumerations: RwLock<EnumerationCache>,
}

impl<P: PermissionRepository> PermissionService<P> {
    pub fn new(permissions: P, cache: Arc<dyn DecisionCache>) -> Self {
        Self {
            permissions,
            cache,
            enumerations: RwLock::new(EnumerationCache::default()),
        }
    }

    pub async fn create(&self, input: CreatePermission) -> VerdictResult<Permission> {
        validate_lengths(&input.resource_type, &input.action)?;
        info!(
            resource_type = %input.resource_type,
            action = %input.action,
            "Creating permission"
        );

        let permission = self.permissions.create(input).await?;
        self.drop_enumerations();
        Ok(permission)
    }

    pub async fn get(&self, id: Uuid) -> VerdictResult<Permission> {
        self.permissions.get_by_id(id).await
    }

    pub async fn get_by_type_and_action(
        &self,
        resource_type: &str,
        action: &str,
    ) -> VerdictResult<Permission> {
        self.permissions
            .get_by_type_and_action(resource_type, action)
            .await
    }

    pub async fn list(
        &self,
        filter: PermissionFilter,
        pagination: Pagination,
    ) -> VerdictResult<PaginatedResult<Permission>> {
        self.permissions.list(filter, pagination).await
    }

    pub async fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdatePermission,
    ) -> VerdictResult<Permission> {
        let existing = self.permissions.get_by_id(id).await?;
        if existing.is_system {
            return Err(VerdictError::BusinessRule {
                message: "System permissions cannot be modified".into(),
            });
        }

        let updated = self.permissions.update(id, expected_version, input).await?;
        self.cache.invalidate_all().await;
        self.drop_enumerations();
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> VerdictResult<()> {
        let existing = self.permissions.get_by_id(id).await?;
        if existing.is_system {
            return Err(VerdictError::BusinessRule {
                message: "System permissions cannot be deleted".into(),
            });
        }

        self.permissions.delete(id).await?;
        self.cache.invalidate_all().await;
        self.drop_enumerations();
        info!(permission_id = %id, "Permission deleted");
        Ok(())
    }

    /// Distinct resource types in the catalog, cached in process.
    pub async fn resource_types(&self) -> VerdictResult<Vec<String>> {
        if let Some(cached) = self
            .enumerations
            .read()
            .expect("enumeration cache poisoned")
            .resource_types
            .clone()
        {
            return Ok(cached);
        }

        let mut types = self.permissions.distinct_resource_types().await?;
        types.sort();
        self.enumerations
            .write()
            .expect("enumeration cache poisoned")
            .resource_types = Some(types.clone());
        Ok(types)
    }

    /// Distinct actions in the catalog, cached in process.
    pub async fn actions(&self) -> VerdictResult<Vec<String>> {
        if let Some(cached) = self
            .enumerations
            .read()
            .expect("enumeration cache poisoned")
            .actions
            .clone()
        {
            return Ok(cached);
        }

        let mut actions = self.permissions.distinct_actions().await?;
        actions.sort();
        self.enumerations
            .write()
            .expect("enumeration cache poisoned")
            .actions = Some(actions.clone());
        Ok(actions)
    }

    fn drop_enumerations(&self) {
        let mut cache = self
            .enumerations
            .write()
            .expect("enumeration cache poisoned");
        cache.resource_types = None;
        cache.actions = None;
    }
}

fn validate_lengths(resource_type: &str, action: &str) -> VerdictResult<()> {
    if resource_type.is_empty() || resource_type.len() > 100 {
        return Err(VerdictError::Validation {
            message: "Resource type must be 1-100 characters".into(),
        });
    }
    if action.is_empty() || action.len() > 50 {
        return Err(VerdictError::Validation {
            message: "Action must be 1-50 characters".into(),
        });
    }
    Ok(())
}
