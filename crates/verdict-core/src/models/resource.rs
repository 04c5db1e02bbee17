//! Resource domain model.
//!
//! Resources are organized hierarchically via `parent_resource_id` and
//! carry policies through a many-to-many link. Ownership and the public
//! flag drive the fast-path shortcuts in the decision engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Globally unique external identifier (e.g. `ds-42`).
    pub resource_identifier: String,
    pub resource_type: String,
    pub name: String,
    pub parent_resource_id: Option<Uuid>,
    /// Free-form attribute map.
    pub attributes: serde_json::Value,
    pub owner_id: Option<Uuid>,
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResource {
    pub tenant_id: Uuid,
    pub resource_identifier: String,
    pub resource_type: String,
    pub name: String,
    pub parent_resource_id: Option<Uuid>,
    pub attributes: Option<serde_json::Value>,
    pub owner_id: Option<Uuid>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateResource {
    pub name: Option<String>,
    pub parent_resource_id: Option<Option<Uuid>>,
    pub attributes: Option<serde_json::Value>,
    pub owner_id: Option<Option<Uuid>>,
    pub is_public: Option<bool>,
    pub is_active: Option<bool>,
}
