//! Policy domain model.
//!
//! A policy is a named, tenant-scoped rule that evaluates to an effect or
//! to not-applicable. Policies reference a set of permissions and a set of
//! resources; `conditions` holds the flavor-specific condition map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permission::Permission;
use super::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyType {
    ResourceBased,
    IdentityBased,
    AttributeBased,
    TimeBased,
    Conditional,
}

/// The outcome a matching policy contributes. DENY always wins over ALLOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyEffect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub policy_type: PolicyType,
    pub effect: PolicyEffect,
    /// Flavor-specific condition map (see the evaluator).
    pub conditions: serde_json::Value,
    /// Higher priority is evaluated first.
    pub priority: i32,
    pub is_active: bool,
    pub is_system: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePolicy {
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub policy_type: PolicyType,
    pub effect: PolicyEffect,
    pub conditions: Option<serde_json::Value>,
    pub priority: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub permission_ids: Vec<Uuid>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdatePolicy {
    pub name: Option<String>,
    pub description: Option<String>,
    pub effect: Option<PolicyEffect>,
    pub conditions: Option<serde_json::Value>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub updated_by: Option<String>,
}

/// A policy together with the permissions and resources it references.
///
/// This is the unit the policy evaluator consumes; repositories assemble it
/// so the evaluator stays free of storage lookups.
#[derive(Debug, Clone)]
pub struct PolicyBundle {
    pub policy: Policy,
    pub permissions: Vec<Permission>,
    pub resources: Vec<PolicyResourceRef>,
}

/// Lightweight reference to a resource attached to a policy.
#[derive(Debug, Clone)]
pub struct PolicyResourceRef {
    pub resource_id: Uuid,
    pub resource_identifier: String,
    pub resource_type: String,
}

/// A resource loaded together with its attached policies.
#[derive(Debug, Clone)]
pub struct ResourceWithPolicies {
    pub resource: Resource,
    pub policies: Vec<PolicyBundle>,
}
