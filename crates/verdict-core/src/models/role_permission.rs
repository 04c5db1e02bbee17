//! Role-permission grant model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Assignment of a permission to a role.
///
/// `(role_id, permission_id)` is unique; a role holds at most 100 grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub permission_id: Uuid,
    /// Free-form constraint map attached to the grant.
    pub constraints: serde_json::Value,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RolePermission {
    /// A grant is live when it has no expiry or the expiry is in the future.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub constraints: Option<serde_json::Value>,
    pub granted_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}
