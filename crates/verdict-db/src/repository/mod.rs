//! SurrealDB repository implementations for the `verdict-core` traits.

mod cross_tenant;
mod permission;
mod policy;
mod resource;
mod role;
mod role_permission;
mod user_role;

pub use cross_tenant::SurrealCrossTenantAccessRepository;
pub use permission::SurrealPermissionRepository;
pub use policy::SurrealPolicyRepository;
pub use resource::SurrealResourceRepository;
pub use role::SurrealRoleRepository;
pub use role_permission::SurrealRolePermissionRepository;
pub use user_role::SurrealUserRoleRepository;

use uuid::Uuid;

use crate::error::DbError;

/// Parses a stored string UUID, mapping failures to a migration error
/// (a malformed id in the store is a data-integrity problem, not a
/// caller mistake).
pub(crate) fn parse_uuid(context: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value)
        .map_err(|e| DbError::Migration(format!("invalid {context} UUID '{value}': {e}")))
}

pub(crate) fn parse_opt_uuid(context: &str, value: Option<String>) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(context, &v)).transpose()
}
