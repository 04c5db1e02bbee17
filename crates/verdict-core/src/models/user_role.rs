//! User-role assignment model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Assignment of a role to a user within a tenant.
///
/// `(user_id, role_id, tenant_id)` has at most one active row. Revocation
/// deactivates rather than deletes, preserving the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl UserRole {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    pub assigned_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A role-permission grant joined with its permission.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    pub grant: super::role_permission::RolePermission,
    pub permission: super::permission::Permission,
}

/// A user-role assignment eagerly joined with the role and its grants.
///
/// This is the aggregate the decision engine loads once per request.
#[derive(Debug, Clone)]
pub struct UserRoleBinding {
    pub assignment: UserRole,
    pub role: super::role::Role,
    pub grants: Vec<PermissionGrant>,
}
