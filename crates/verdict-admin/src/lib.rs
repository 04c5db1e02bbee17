//! Verdict Admin — administrative services over the authorization data
//! model.
//!
//! Every mutating operation enforces the model invariants (uniqueness,
//! system-role protection, caps, hierarchy bounds), invalidates the
//! decision cache, and emits its audit event fire-and-forget.

pub mod cross_tenant;
pub mod maintenance;
pub mod permission_service;
pub mod policy_service;
pub mod resource_service;
pub mod role_service;
pub mod tenant_sync;
pub mod user_role_service;

pub use cross_tenant::CrossTenantAccessService;
pub use maintenance::MaintenanceService;
pub use permission_service::PermissionService;
pub use policy_service::PolicyService;
pub use resource_service::ResourceService;
pub use role_service::{RoleLimits, RoleService};
pub use tenant_sync::TenantSyncService;
pub use user_role_service::UserRoleService;
