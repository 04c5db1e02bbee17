//! Decision request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authorization question: may `user_id` perform `action` on
/// `resource` within `tenant_id`?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzRequest {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// Resource type being accessed (e.g. `DATASET`).
    pub resource: String,
    /// Action verb (e.g. `READ`).
    pub action: String,
    /// External identifier of a concrete resource, when the question is
    /// about one (enables ownership, public-read, and resource policies).
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Target tenant for cross-tenant requests.
    #[serde(default)]
    pub target_tenant_id: Option<Uuid>,
    /// Caller-supplied request attributes for attribute-based policies.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl AuthzRequest {
    /// Minimal request with no resource context.
    pub fn new(user_id: Uuid, tenant_id: Uuid, resource: &str, action: &str) -> Self {
        Self {
            user_id,
            tenant_id,
            resource: resource.to_string(),
            action: action.to_string(),
            resource_id: None,
            target_tenant_id: None,
            attributes: serde_json::Map::new(),
            ip_address: None,
            user_agent: None,
        }
    }
}

/// The decision: allowed or denied, with the reason and the permissions
/// that justified it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzResponse {
    pub allowed: bool,
    pub reason: String,
    /// `TYPE:ACTION` names, sorted.
    pub granted_permissions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuthzResponse {
    pub fn allowed(reason: impl Into<String>, mut granted_permissions: Vec<String>) -> Self {
        granted_permissions.sort();
        Self {
            allowed: true,
            reason: reason.into(),
            granted_permissions,
            timestamp: Utc::now(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            granted_permissions: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_sorts_permission_names() {
        let response = AuthzResponse::allowed(
            "Direct permission granted",
            vec!["REPORT:VIEW".into(), "REPORT:READ".into()],
        );
        assert_eq!(
            response.granted_permissions,
            vec!["REPORT:READ".to_string(), "REPORT:VIEW".to_string()]
        );
        assert!(response.allowed);
    }

    #[test]
    fn denied_has_no_permissions() {
        let response = AuthzResponse::denied("No permission for REPORT:READ");
        assert!(!response.allowed);
        assert!(response.granted_permissions.is_empty());
    }
}
