//! Permission domain model.
//!
//! A permission is a `(resource_type, action)` capability. The pair is
//! globally unique; roles reference permissions through role-permission
//! grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk classification of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    /// Resource type this permission applies to (e.g. `DATASET`, or `*`).
    pub resource_type: String,
    /// Action verb (e.g. `READ`, `MANAGE`).
    pub action: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub requires_mfa: bool,
    pub requires_approval: bool,
    pub is_system: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-lock counter, bumped on every update.
    pub version: u64,
}

impl Permission {
    /// Canonical `TYPE:ACTION` name used in responses and events.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.resource_type, self.action)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub resource_type: String,
    pub action: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub requires_mfa: bool,
    pub requires_approval: bool,
    pub is_system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdatePermission {
    pub description: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub requires_mfa: Option<bool>,
    pub requires_approval: Option<bool>,
    pub is_active: Option<bool>,
}
