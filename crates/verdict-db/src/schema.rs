//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. Free-form maps (conditions,
//! attributes, constraints) are FLEXIBLE objects.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Permissions (global catalog)
-- =======================================================================
DEFINE TABLE permission SCHEMAFULL;
DEFINE FIELD resource_type ON TABLE permission TYPE string;
DEFINE FIELD action ON TABLE permission TYPE string;
DEFINE FIELD description ON TABLE permission TYPE string;
DEFINE FIELD risk_level ON TABLE permission TYPE string \
    ASSERT $value IN ['Low', 'Medium', 'High', 'Critical'];
DEFINE FIELD requires_mfa ON TABLE permission TYPE bool DEFAULT false;
DEFINE FIELD requires_approval ON TABLE permission TYPE bool \
    DEFAULT false;
DEFINE FIELD is_system ON TABLE permission TYPE bool DEFAULT false;
DEFINE FIELD is_active ON TABLE permission TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD version ON TABLE permission TYPE int DEFAULT 0;
DEFINE INDEX idx_permission_type_action ON TABLE permission \
    COLUMNS resource_type, action UNIQUE;
DEFINE INDEX idx_permission_type ON TABLE permission \
    COLUMNS resource_type;

-- =======================================================================
-- Roles (tenant scope; tenant_id NONE = global)
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE role TYPE option<string>;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD description ON TABLE role TYPE string;
DEFINE FIELD priority ON TABLE role TYPE int DEFAULT 100;
DEFINE FIELD max_users ON TABLE role TYPE option<int>;
DEFINE FIELD is_system ON TABLE role TYPE bool DEFAULT false;
DEFINE FIELD is_active ON TABLE role TYPE bool DEFAULT true;
DEFINE FIELD parent_role_id ON TABLE role TYPE option<string>;
DEFINE FIELD created_by ON TABLE role TYPE string;
DEFINE FIELD updated_by ON TABLE role TYPE option<string>;
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD version ON TABLE role TYPE int DEFAULT 0;
DEFINE INDEX idx_role_name_tenant ON TABLE role \
    COLUMNS name, tenant_id UNIQUE;
DEFINE INDEX idx_role_tenant_active ON TABLE role \
    COLUMNS tenant_id, is_active;
DEFINE INDEX idx_role_parent ON TABLE role COLUMNS parent_role_id;

-- =======================================================================
-- Role-permission grants
-- =======================================================================
DEFINE TABLE role_permission SCHEMAFULL;
DEFINE FIELD role_id ON TABLE role_permission TYPE string;
DEFINE FIELD permission_id ON TABLE role_permission TYPE string;
DEFINE FIELD constraints ON TABLE role_permission TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD granted_by ON TABLE role_permission TYPE string;
DEFINE FIELD granted_at ON TABLE role_permission TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE role_permission TYPE option<datetime>;
DEFINE INDEX idx_role_permission_pair ON TABLE role_permission \
    COLUMNS role_id, permission_id UNIQUE;
DEFINE INDEX idx_role_permission_role ON TABLE role_permission \
    COLUMNS role_id;

-- =======================================================================
-- User-role assignments
-- =======================================================================
DEFINE TABLE user_role SCHEMAFULL;
DEFINE FIELD user_id ON TABLE user_role TYPE string;
DEFINE FIELD role_id ON TABLE user_role TYPE string;
DEFINE FIELD tenant_id ON TABLE user_role TYPE string;
DEFINE FIELD assigned_by ON TABLE user_role TYPE string;
DEFINE FIELD assigned_at ON TABLE user_role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE user_role TYPE option<datetime>;
DEFINE FIELD is_active ON TABLE user_role TYPE bool DEFAULT true;
DEFINE INDEX idx_user_role_triple ON TABLE user_role \
    COLUMNS user_id, role_id, tenant_id UNIQUE;
DEFINE INDEX idx_user_role_user_tenant ON TABLE user_role \
    COLUMNS user_id, tenant_id;
DEFINE INDEX idx_user_role_role ON TABLE user_role COLUMNS role_id;

-- =======================================================================
-- Resources (tenant scope)
-- =======================================================================
DEFINE TABLE resource SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE resource TYPE string;
DEFINE FIELD resource_identifier ON TABLE resource TYPE string;
DEFINE FIELD resource_type ON TABLE resource TYPE string;
DEFINE FIELD name ON TABLE resource TYPE string;
DEFINE FIELD parent_resource_id ON TABLE resource TYPE option<string>;
DEFINE FIELD attributes ON TABLE resource TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD owner_id ON TABLE resource TYPE option<string>;
DEFINE FIELD is_public ON TABLE resource TYPE bool DEFAULT false;
DEFINE FIELD is_active ON TABLE resource TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD version ON TABLE resource TYPE int DEFAULT 0;
DEFINE INDEX idx_resource_identifier ON TABLE resource \
    COLUMNS resource_identifier UNIQUE;
DEFINE INDEX idx_resource_tenant ON TABLE resource COLUMNS tenant_id;
DEFINE INDEX idx_resource_parent ON TABLE resource \
    COLUMNS parent_resource_id;

-- =======================================================================
-- Policies (tenant scope; tenant_id NONE = global)
-- =======================================================================
DEFINE TABLE policy SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE policy TYPE option<string>;
DEFINE FIELD name ON TABLE policy TYPE string;
DEFINE FIELD description ON TABLE policy TYPE string;
DEFINE FIELD policy_type ON TABLE policy TYPE string \
    ASSERT $value IN ['ResourceBased', 'IdentityBased', \
    'AttributeBased', 'TimeBased', 'Conditional'];
DEFINE FIELD effect ON TABLE policy TYPE string \
    ASSERT $value IN ['Allow', 'Deny'];
DEFINE FIELD conditions ON TABLE policy TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD priority ON TABLE policy TYPE int DEFAULT 100;
DEFINE FIELD is_active ON TABLE policy TYPE bool DEFAULT true;
DEFINE FIELD is_system ON TABLE policy TYPE bool DEFAULT false;
DEFINE FIELD start_date ON TABLE policy TYPE option<datetime>;
DEFINE FIELD end_date ON TABLE policy TYPE option<datetime>;
DEFINE FIELD created_by ON TABLE policy TYPE string;
DEFINE FIELD updated_by ON TABLE policy TYPE option<string>;
DEFINE FIELD created_at ON TABLE policy TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE policy TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD version ON TABLE policy TYPE int DEFAULT 0;
DEFINE INDEX idx_policy_name_tenant ON TABLE policy \
    COLUMNS name, tenant_id UNIQUE;
DEFINE INDEX idx_policy_tenant_active ON TABLE policy \
    COLUMNS tenant_id, is_active;

-- =======================================================================
-- Policy <-> Permission links
-- =======================================================================
DEFINE TABLE policy_permission SCHEMAFULL;
DEFINE FIELD policy_id ON TABLE policy_permission TYPE string;
DEFINE FIELD permission_id ON TABLE policy_permission TYPE string;
DEFINE INDEX idx_policy_permission_pair ON TABLE policy_permission \
    COLUMNS policy_id, permission_id UNIQUE;
DEFINE INDEX idx_policy_permission_policy ON TABLE policy_permission \
    COLUMNS policy_id;

-- =======================================================================
-- Resource <-> Policy links
-- =======================================================================
DEFINE TABLE resource_policy SCHEMAFULL;
DEFINE FIELD resource_id ON TABLE resource_policy TYPE string;
DEFINE FIELD policy_id ON TABLE resource_policy TYPE string;
DEFINE INDEX idx_resource_policy_pair ON TABLE resource_policy \
    COLUMNS resource_id, policy_id UNIQUE;
DEFINE INDEX idx_resource_policy_resource ON TABLE resource_policy \
    COLUMNS resource_id;
DEFINE INDEX idx_resource_policy_policy ON TABLE resource_policy \
    COLUMNS policy_id;

-- =======================================================================
-- Cross-tenant access grants
-- =======================================================================
DEFINE TABLE cross_tenant_access SCHEMAFULL;
DEFINE FIELD source_tenant_id ON TABLE cross_tenant_access TYPE string;
DEFINE FIELD target_tenant_id ON TABLE cross_tenant_access TYPE string;
DEFINE FIELD resource_type ON TABLE cross_tenant_access TYPE string;
DEFINE FIELD resource_id ON TABLE cross_tenant_access \
    TYPE option<string>;
DEFINE FIELD permissions ON TABLE cross_tenant_access TYPE array;
DEFINE FIELD permissions.* ON TABLE cross_tenant_access TYPE string;
DEFINE FIELD conditions ON TABLE cross_tenant_access \
    TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD granted_by ON TABLE cross_tenant_access TYPE string;
DEFINE FIELD granted_at ON TABLE cross_tenant_access TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE cross_tenant_access \
    TYPE option<datetime>;
DEFINE FIELD revoked_by ON TABLE cross_tenant_access \
    TYPE option<string>;
DEFINE FIELD revoked_at ON TABLE cross_tenant_access \
    TYPE option<datetime>;
DEFINE FIELD is_active ON TABLE cross_tenant_access TYPE bool \
    DEFAULT true;
DEFINE INDEX idx_cross_tenant_tenants ON TABLE cross_tenant_access \
    COLUMNS source_tenant_id, target_tenant_id, resource_type;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;
        }
    }

    Ok(())
}
