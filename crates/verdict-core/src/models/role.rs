//! Role domain model.
//!
//! Roles form a hierarchy via `parent_role_id`. The chain is acyclic with
//! depth at most 10; a parent must live in the same tenant as the child
//! (or both be global). System roles are managed by tenant provisioning
//! and cannot be mutated through normal operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    /// `None` for global roles such as `SUPER_ADMIN`.
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    /// Higher priority wins when ordering roles (1..=10000).
    pub priority: i32,
    /// Cap on concurrently active user assignments, when set.
    pub max_users: Option<u32>,
    pub is_system: bool,
    pub is_active: bool,
    pub parent_role_id: Option<Uuid>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub priority: i32,
    pub max_users: Option<u32>,
    pub is_system: bool,
    pub parent_role_id: Option<Uuid>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub max_users: Option<Option<u32>>,
    pub is_active: Option<bool>,
    pub updated_by: Option<String>,
}
