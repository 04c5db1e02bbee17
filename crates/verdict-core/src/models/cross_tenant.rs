//! Cross-tenant access grant model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An explicit grant letting a source tenant act on a target tenant's
/// resources of one type. `(source, target, resource_type)` has at most one
/// active grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossTenantAccess {
    pub id: Uuid,
    pub source_tenant_id: Uuid,
    pub target_tenant_id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Action strings covered by the grant.
    pub permissions: Vec<String>,
    pub conditions: serde_json::Value,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl CrossTenantAccess {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCrossTenantAccess {
    pub source_tenant_id: Uuid,
    pub target_tenant_id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub permissions: Vec<String>,
    pub conditions: Option<serde_json::Value>,
    pub granted_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}
