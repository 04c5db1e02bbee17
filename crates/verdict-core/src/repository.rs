//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped queries take a
//! `tenant_id` parameter to enforce data isolation; entity lookups by
//! primary id are global because global roles and policies carry no tenant.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::VerdictResult;
use crate::models::{
    cross_tenant::{CreateCrossTenantAccess, CrossTenantAccess},
    permission::{CreatePermission, Permission, UpdatePermission},
    policy::{CreatePolicy, Policy, PolicyBundle, ResourceWithPolicies, UpdatePolicy},
    resource::{CreateResource, Resource, UpdateResource},
    role::{CreateRole, Role, UpdateRole},
    role_permission::{CreateRolePermission, RolePermission},
    user_role::{CreateUserRole, PermissionGrant, UserRole, UserRoleBinding},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Filter for permission listings.
#[derive(Debug, Clone, Default)]
pub struct PermissionFilter {
    pub resource_type: Option<String>,
    pub action: Option<String>,
    pub is_active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = VerdictResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VerdictResult<Role>> + Send;
    fn get_by_name(
        &self,
        tenant_id: Option<Uuid>,
        name: &str,
    ) -> impl Future<Output = VerdictResult<Role>> + Send;
    fn exists_by_name(
        &self,
        tenant_id: Option<Uuid>,
        name: &str,
    ) -> impl Future<Output = VerdictResult<bool>> + Send;
    /// Rejects stale writes: the caller passes the version it read and the
    /// update fails with `Conflict` when the stored version differs.
    fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdateRole,
    ) -> impl Future<Output = VerdictResult<Role>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = VerdictResult<()>> + Send;
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = VerdictResult<PaginatedResult<Role>>> + Send;
    fn list_active_by_tenant(
        &self,
        tenant_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<Role>>> + Send;
    fn list_system_by_tenant(
        &self,
        tenant_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<Role>>> + Send;
    /// Direct children referencing the role as parent.
    fn find_children(&self, role_id: Uuid) -> impl Future<Output = VerdictResult<Vec<Role>>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    fn count_by_tenant(&self, tenant_id: Uuid) -> impl Future<Output = VerdictResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

pub trait PermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = VerdictResult<Permission>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VerdictResult<Permission>> + Send;
    fn get_by_type_and_action(
        &self,
        resource_type: &str,
        action: &str,
    ) -> impl Future<Output = VerdictResult<Permission>> + Send;
    /// Idempotent creation keyed on `(resource_type, action)`.
    fn find_or_create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = VerdictResult<Permission>> + Send;
    fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdatePermission,
    ) -> impl Future<Output = VerdictResult<Permission>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = VerdictResult<()>> + Send;
    fn list(
        &self,
        filter: PermissionFilter,
        pagination: Pagination,
    ) -> impl Future<Output = VerdictResult<PaginatedResult<Permission>>> + Send;
    /// Active permissions whose resource type is in the given scope.
    fn list_by_resource_types(
        &self,
        resource_types: &[String],
    ) -> impl Future<Output = VerdictResult<Vec<Permission>>> + Send;
    fn distinct_resource_types(&self) -> impl Future<Output = VerdictResult<Vec<String>>> + Send;
    fn distinct_actions(&self) -> impl Future<Output = VerdictResult<Vec<String>>> + Send;
}

// ---------------------------------------------------------------------------
// Role-permission grants
// ---------------------------------------------------------------------------

pub trait RolePermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreateRolePermission,
    ) -> impl Future<Output = VerdictResult<RolePermission>> + Send;
    fn exists(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = VerdictResult<bool>> + Send;
    fn count_by_role(&self, role_id: Uuid) -> impl Future<Output = VerdictResult<u64>> + Send;
    /// Grants of a role joined with their permissions, unexpired and with
    /// the permission active.
    fn list_active_grants(
        &self,
        role_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<PermissionGrant>>> + Send;
    fn list_by_role(
        &self,
        role_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<RolePermission>>> + Send;
    fn remove(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    fn remove_all_for_role(&self, role_id: Uuid) -> impl Future<Output = VerdictResult<()>> + Send;
    fn set_expiration(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    fn update_constraints(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        constraints: serde_json::Value,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    /// Grants expiring inside the window, for operator reporting.
    fn find_expiring(
        &self,
        role_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = VerdictResult<Vec<RolePermission>>> + Send;
    /// Removes grants whose expiry has passed; returns the removed count.
    fn delete_expired(&self, now: DateTime<Utc>)
    -> impl Future<Output = VerdictResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// User-role assignments
// ---------------------------------------------------------------------------

pub trait UserRoleRepository: Send + Sync {
    fn create(&self, input: CreateUserRole)
    -> impl Future<Output = VerdictResult<UserRole>> + Send;
    fn find(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Option<UserRole>>> + Send;
    fn count_active_for_role(
        &self,
        role_id: Uuid,
    ) -> impl Future<Output = VerdictResult<u64>> + Send;
    fn list_active_by_user(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<UserRole>>> + Send;
    fn list_active_by_user_all_tenants(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<UserRole>>> + Send;
    fn list_active_by_role(
        &self,
        role_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<UserRole>>> + Send;
    /// The eager join the decision engine runs once per request: active,
    /// unexpired assignments with their role and the role's live grants.
    fn find_active_bindings(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<UserRoleBinding>>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    /// Deactivates assignments whose expiry has passed; returns the count.
    fn deactivate_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = VerdictResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

pub trait ResourceRepository: Send + Sync {
    fn create(&self, input: CreateResource)
    -> impl Future<Output = VerdictResult<Resource>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VerdictResult<Resource>> + Send;
    fn get_by_identifier(
        &self,
        identifier: &str,
    ) -> impl Future<Output = VerdictResult<Resource>> + Send;
    /// Resource plus its attached policy bundles, or `None` when the
    /// identifier does not resolve.
    fn get_by_identifier_with_policies(
        &self,
        identifier: &str,
    ) -> impl Future<Output = VerdictResult<Option<ResourceWithPolicies>>> + Send;
    fn exists_by_identifier(
        &self,
        identifier: &str,
    ) -> impl Future<Output = VerdictResult<bool>> + Send;
    fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdateResource,
    ) -> impl Future<Output = VerdictResult<Resource>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = VerdictResult<()>> + Send;
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = VerdictResult<PaginatedResult<Resource>>> + Send;
    fn find_children(
        &self,
        resource_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<Resource>>> + Send;
    fn attach_policy(
        &self,
        resource_id: Uuid,
        policy_id: Uuid,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    fn detach_policy(
        &self,
        resource_id: Uuid,
        policy_id: Uuid,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

pub trait PolicyRepository: Send + Sync {
    fn create(&self, input: CreatePolicy) -> impl Future<Output = VerdictResult<Policy>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VerdictResult<Policy>> + Send;
    fn get_bundle(&self, id: Uuid) -> impl Future<Output = VerdictResult<PolicyBundle>> + Send;
    fn exists_by_name(
        &self,
        tenant_id: Option<Uuid>,
        name: &str,
    ) -> impl Future<Output = VerdictResult<bool>> + Send;
    fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdatePolicy,
    ) -> impl Future<Output = VerdictResult<Policy>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = VerdictResult<()>> + Send;
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = VerdictResult<PaginatedResult<Policy>>> + Send;
    /// Active tenant policies inside their date window, priority descending,
    /// each joined with referenced permissions and resources.
    fn find_active_for_tenant(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = VerdictResult<Vec<PolicyBundle>>> + Send;
    fn add_permission(
        &self,
        policy_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    fn remove_permission(
        &self,
        policy_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    /// Deactivates policies whose end date has passed; returns the count.
    fn deactivate_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = VerdictResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Cross-tenant access
// ---------------------------------------------------------------------------

pub trait CrossTenantAccessRepository: Send + Sync {
    fn create(
        &self,
        input: CreateCrossTenantAccess,
    ) -> impl Future<Output = VerdictResult<CrossTenantAccess>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VerdictResult<CrossTenantAccess>> + Send;
    fn exists_active(
        &self,
        source_tenant_id: Uuid,
        target_tenant_id: Uuid,
        resource_type: &str,
    ) -> impl Future<Output = VerdictResult<bool>> + Send;
    fn find_active(
        &self,
        source_tenant_id: Uuid,
        target_tenant_id: Uuid,
        resource_type: &str,
    ) -> impl Future<Output = VerdictResult<Vec<CrossTenantAccess>>> + Send;
    fn list_active_by_tenant(
        &self,
        tenant_id: Uuid,
    ) -> impl Future<Output = VerdictResult<Vec<CrossTenantAccess>>> + Send;
    fn revoke(
        &self,
        id: Uuid,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> impl Future<Output = VerdictResult<()>> + Send;
    /// Deactivates grants whose expiry has passed; returns the count.
    fn deactivate_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = VerdictResult<u64>> + Send;
}
