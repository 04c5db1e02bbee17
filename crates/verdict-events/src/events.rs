//! Audit event types.
//!
//! One canonical variant per event kind; flavor-specific fields mirror
//! what the administrative services record. Events are serialized as JSON
//! envelopes for publication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata attached to every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub source_service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

impl EventMetadata {
    pub fn new(correlation_id: Option<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            source_service: "verdict-authz".into(),
            version: "1.0".into(),
            timestamp: Utc::now(),
            correlation_id,
        }
    }
}

/// Audit events emitted by the decision engine and the administrative
/// services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthzEvent {
    AuthorizationChecked {
        user_id: Uuid,
        tenant_id: Uuid,
        resource: String,
        action: String,
        allowed: bool,
        reason: String,
        ip_address: Option<String>,
    },
    RoleCreated {
        role_id: Uuid,
        tenant_id: Option<Uuid>,
        role_name: String,
        created_by: String,
    },
    RoleUpdated {
        role_id: Uuid,
        tenant_id: Option<Uuid>,
        changes: BTreeMap<String, String>,
        updated_by: String,
    },
    RoleDeleted {
        role_id: Uuid,
        tenant_id: Option<Uuid>,
        deleted_by: String,
    },
    RoleAssigned {
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Uuid,
        role_name: String,
        assigned_by: String,
    },
    RoleRevoked {
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Uuid,
        revoked_by: String,
    },
    PermissionGranted {
        role_id: Uuid,
        tenant_id: Option<Uuid>,
        permission_id: Uuid,
        resource_type: String,
        action: String,
        granted_by: String,
    },
    PermissionRevoked {
        role_id: Uuid,
        permission_id: Uuid,
        revoked_by: String,
    },
    PolicyCreated {
        policy_id: Uuid,
        tenant_id: Option<Uuid>,
        policy_name: String,
        created_by: String,
    },
    PolicyEvaluated {
        policy_id: Uuid,
        policy_name: String,
        effect: Option<String>,
        evaluated_at: DateTime<Utc>,
    },
    CrossTenantAccessGranted {
        source_tenant_id: Uuid,
        target_tenant_id: Uuid,
        resource_type: String,
        granted_by: String,
    },
    CrossTenantAccessRevoked {
        source_tenant_id: Uuid,
        target_tenant_id: Uuid,
        resource_type: String,
        revoked_by: String,
    },
}

impl AuthzEvent {
    /// Routing key suffix for the event, appended to the configured topic
    /// prefix by the AMQP sink.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzEvent::AuthorizationChecked { .. } => "checked",
            AuthzEvent::RoleCreated { .. } => "role-created",
            AuthzEvent::RoleUpdated { .. } => "role-updated",
            AuthzEvent::RoleDeleted { .. } => "role-deleted",
            AuthzEvent::RoleAssigned { .. } => "role-assigned",
            AuthzEvent::RoleRevoked { .. } => "role-revoked",
            AuthzEvent::PermissionGranted { .. } => "permission-granted",
            AuthzEvent::PermissionRevoked { .. } => "permission-revoked",
            AuthzEvent::PolicyCreated { .. } => "policy-created",
            AuthzEvent::PolicyEvaluated { .. } => "policy-evaluated",
            AuthzEvent::CrossTenantAccessGranted { .. } => "cross-tenant-granted",
            AuthzEvent::CrossTenantAccessRevoked { .. } => "cross-tenant-revoked",
        }
    }

    /// Partitioning key: the id whose ordering matters for this event.
    pub fn partition_key(&self) -> String {
        match self {
            AuthzEvent::AuthorizationChecked { user_id, .. } => user_id.to_string(),
            AuthzEvent::RoleCreated { role_id, .. }
            | AuthzEvent::RoleUpdated { role_id, .. }
            | AuthzEvent::RoleDeleted { role_id, .. }
            | AuthzEvent::PermissionGranted { role_id, .. }
            | AuthzEvent::PermissionRevoked { role_id, .. } => role_id.to_string(),
            AuthzEvent::RoleAssigned { user_id, .. }
            | AuthzEvent::RoleRevoked { user_id, .. } => user_id.to_string(),
            AuthzEvent::PolicyCreated { policy_id, .. }
            | AuthzEvent::PolicyEvaluated { policy_id, .. } => policy_id.to_string(),
            AuthzEvent::CrossTenantAccessGranted {
                source_tenant_id, ..
            }
            | AuthzEvent::CrossTenantAccessRevoked {
                source_tenant_id, ..
            } => source_tenant_id.to_string(),
        }
    }
}

/// The wire form of a published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub metadata: EventMetadata,
    #[serde(flatten)]
    pub event: AuthzEvent,
}

impl EventEnvelope {
    pub fn new(event: AuthzEvent) -> Self {
        Self {
            metadata: EventMetadata::new(None),
            event,
        }
    }
}
