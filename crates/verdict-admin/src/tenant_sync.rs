//! Tenant provisioning.
//!
//! When a tenant is created, a default set of system roles is
//! materialized for it and the creating user receives `TENANT_ADMIN`.
//! Every step is idempotent: duplicate-key failures mean a previous
//! delivery already did the work and are absorbed, so at-least-once
//! delivery of tenant events is safe.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::permission::{CreatePermission, Permission, RiskLevel};
use verdict_core::models::role::CreateRole;
use verdict_core::models::role_permission::CreateRolePermission;
use verdict_core::models::user_role::CreateUserRole;
use verdict_core::repository::{
    PermissionRepository, RolePermissionRepository, RoleRepository, UserRoleRepository,
};
use verdict_engine::DecisionCache;
use verdict_events::{AuthzEvent, EventSink, HandlerError, TenantLifecycleHandler};

const SYSTEM_ACTOR: &str = "SYSTEM";
const TENANT_ADMIN_ROLE: &str = "TENANT_ADMIN";

/// How a role definition selects actions out of its resource-type scope.
enum ActionFilter {
    /// Every action except the listed ones.
    AllExcept(&'static [&'static str]),
    /// Every action except those starting with one of the prefixes or
    /// equal to one of the listed actions.
    ExcludePrefixed {
        prefixes: &'static [&'static str],
        actions: &'static [&'static str],
    },
    /// Only the listed actions.
    Only(&'static [&'static str]),
}

impl ActionFilter {
    fn accepts(&self, action: &str) -> bool {
        match self {
            ActionFilter::AllExcept(excluded) => !excluded.contains(&action),
            ActionFilter::ExcludePrefixed { prefixes, actions } => {
                !prefixes.iter().any(|p| action.starts_with(p))
                    && !actions.contains(&action)
            }
            ActionFilter::Only(allowed) => allowed.contains(&action),
        }
    }
}

struct RoleDefinition {
    name: &'static str,
    description: &'static str,
    priority: i32,
    resource_types: &'static [&'static str],
    filter: ActionFilter,
}

/// The default role set materialized for every new tenant.
static DEFAULT_ROLES: &[RoleDefinition] = &[
    RoleDefinition {
        name: TENANT_ADMIN_ROLE,
        description: "Administrator role with full tenant management capabilities",
        priority: 1000,
        resource_types: &[
            "TENANT", "USER", "ROLE", "PERMISSION", "WORKSPACE", "AUDIT", "SYSTEM_CONFIG",
            "BILLING",
        ],
        filter: ActionFilter::AllExcept(&["DELETE_TENANT"]),
    },
    RoleDefinition {
        name: "DATA_STEWARD",
        description: "Manages data catalogs, quality, lineage, and data lifecycle operations",
        priority: 900,
        resource_types: &[
            "DATASET",
            "DATA_CATALOG",
            "DATA_QUALITY",
            "DATA_LINEAGE",
            "METADATA",
            "DATA_INGESTION",
            "DATA_TRANSFORMATION",
        ],
        filter: ActionFilter::AllExcept(&["DELETE_TENANT"]),
    },
    RoleDefinition {
        name: "PRIVACY_OFFICER",
        description: "Handles compliance, audit trails, privacy controls, and regulatory requirements",
        priority: 850,
        resource_types: &[
            "PRIVACY_SETTINGS",
            "AUDIT",
            "COMPLIANCE",
            "PII_MANAGEMENT",
            "ENCRYPTION",
            "DIFFERENTIAL_PRIVACY",
            "DISCLOSURE_RISK",
        ],
        filter: ActionFilter::AllExcept(&["DELETE_TENANT"]),
    },
    RoleDefinition {
        name: "DATA_CONTRIBUTOR",
        description: "Can ingest, upload, and contribute data to the platform",
        priority: 800,
        resource_types: &["DATA_INGESTION", "DATASET", "METADATA"],
        filter: ActionFilter::Only(&["CREATE", "UPDATE", "READ", "UPLOAD"]),
    },
    RoleDefinition {
        name: "STATISTICIAN",
        description: "Full access to statistical computing engine and advanced analytics",
        priority: 700,
        resource_types: &[
            "STATISTICAL_ENGINE",
            "ML_PIPELINE",
            "ANALYSIS_TEMPLATE",
            "REPORT",
            "DATASET",
            "CUSTOM_METHODOLOGY",
        ],
        filter: ActionFilter::ExcludePrefixed {
            prefixes: &["ADMIN_"],
            actions: &["DELETE_TENANT"],
        },
    },
    RoleDefinition {
        name: "DATA_SCIENTIST",
        description: "Machine learning pipeline access and model development capabilities",
        priority: 650,
        resource_types: &[
            "ML_PIPELINE",
            "STATISTICAL_ENGINE",
            "ANALYSIS_TEMPLATE",
            "DATASET",
            "MODEL_DEPLOYMENT",
        ],
        filter: ActionFilter::Only(&["CREATE", "UPDATE", "READ", "EXECUTE", "DEPLOY"]),
    },
    RoleDefinition {
        name: "ANALYST",
        description: "Can run pre-built analyses and standard statistical operations",
        priority: 600,
        resource_types: &["ANALYSIS_TEMPLATE", "REPORT", "DATASET", "BASIC_STATISTICS"],
        filter: ActionFilter::Only(&["READ", "EXECUTE", "CREATE_REPORT"]),
    },
    RoleDefinition {
        name: "WORKSPACE_ADMIN",
        description: "Manages shared workspaces and collaboration settings",
        priority: 550,
        resource_types: &[
            "WORKSPACE",
            "COLLABORATION",
            "DATA_SHARING_AGREEMENT",
            "WORKFLOW_APPROVAL",
        ],
        filter: ActionFilter::ExcludePrefixed {
            prefixes: &["SYSTEM_"],
            actions: &[],
        },
    },
    RoleDefinition {
        name: "EXTERNAL_COLLABORATOR",
        description: "Limited access for inter-organizational collaboration",
        priority: 500,
        resource_types: &[
            "SHARED_WORKSPACE",
            "COLLABORATIVE_ANALYSIS",
            "SHARED_DATASET",
        ],
        filter: ActionFilter::Only(&["READ", "COLLABORATE", "COMMENT"]),
    },
    RoleDefinition {
        name: "DASHBOARD_CREATOR",
        description: "Can create and manage interactive dashboards and visualizations",
        priority: 450,
        resource_types: &["DASHBOARD", "VISUALIZATION", "CHART_LIBRARY", "EXPORT"],
        filter: ActionFilter::Only(&["CREATE", "UPDATE", "READ", "PUBLISH", "EXPORT"]),
    },
    RoleDefinition {
        name: "DATA_CONSUMER",
        description: "Read-only access to datasets and published analyses",
        priority: 300,
        resource_types: &["DATASET", "REPORT", "PUBLISHED_ANALYSIS"],
        filter: ActionFilter::Only(&["READ", "VIEW"]),
    },
    RoleDefinition {
        name: "REVIEWER",
        description: "Can review and approve statistical outputs before publication",
        priority: 250,
        resource_types: &["REPORT", "ANALYSIS_REVIEW", "PUBLICATION_APPROVAL"],
        filter: ActionFilter::Only(&["READ", "REVIEW", "APPROVE", "REJECT"]),
    },
    RoleDefinition {
        name: "VIEWER",
        description: "Read-only access to dashboards and visualizations",
        priority: 100,
        resource_types: &["DASHBOARD", "VISUALIZATION", "PUBLIC_REPORT"],
        filter: ActionFilter::Only(&["READ", "VIEW"]),
    },
];

/// Actions every resource type supports.
static BASE_ACTIONS: &[&str] = &["CREATE", "READ", "UPDATE", "DELETE", "MANAGE", "VIEW"];

/// Type-specific actions on top of the base set. Keeping the catalog
/// tailored per resource type also keeps every default role under the
/// 100-grants-per-role cap.
fn extra_actions_for(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "DATASET" | "SHARED_DATASET" | "DATA_INGESTION" => {
            &["UPLOAD", "EXPORT", "SHARE", "COLLABORATE"]
        }
        "DATA_CATALOG" | "DATA_QUALITY" | "DATA_LINEAGE" | "METADATA"
        | "DATA_TRANSFORMATION" => &["EXPORT"],
        "STATISTICAL_ENGINE" | "ML_PIPELINE" | "BASIC_STATISTICS" | "CUSTOM_METHODOLOGY" => {
            &["EXECUTE", "SCHEDULE"]
        }
        "MODEL_DEPLOYMENT" => &["EXECUTE", "DEPLOY"],
        "ANALYSIS_TEMPLATE" => &["EXECUTE", "CREATE_REPORT", "SHARE"],
        "REPORT" | "PUBLISHED_ANALYSIS" | "PUBLIC_REPORT" => {
            &["EXPORT", "PUBLISH", "REVIEW", "APPROVE", "REJECT", "CREATE_REPORT"]
        }
        "ANALYSIS_REVIEW" | "PUBLICATION_APPROVAL" | "WORKFLOW_APPROVAL" => {
            &["REVIEW", "APPROVE", "REJECT"]
        }
        "DASHBOARD" | "VISUALIZATION" | "CHART_LIBRARY" | "EXPORT" => &["EXPORT", "PUBLISH"],
        "WORKSPACE" | "SHARED_WORKSPACE" | "COLLABORATION" | "COLLABORATIVE_ANALYSIS" => {
            &["COLLABORATE", "COMMENT", "SHARE"]
        }
        "DATA_SHARING_AGREEMENT" => &["APPROVE", "REJECT", "SHARE"],
        "AUDIT" => &["AUDIT", "EXPORT", "MONITOR"],
        "SYSTEM_CONFIG" => &["CONFIGURE", "MONITOR"],
        "PRIVACY_SETTINGS" | "COMPLIANCE" | "PII_MANAGEMENT" | "ENCRYPTION"
        | "DIFFERENTIAL_PRIVACY" | "DISCLOSURE_RISK" => &["CONFIGURE", "AUDIT"],
        _ => &[],
    }
}

pub struct TenantSyncService<R, P, RP, UR> {
    roles: R,
    permissions: P,
    role_permissions: RP,
    user_roles: UR,
    events: Arc<dyn EventSink>,
    cache: Arc<dyn DecisionCache>,
}

impl<R, P, RP, UR> TenantSyncService<R, P, RP, UR>
where
    R: RoleRepository,
    P: PermissionRepository,
    RP: RolePermissionRepository,
    UR: UserRoleRepository,
{
    pub fn new(
        roles: R,
        permissions: P,
        role_permissions: RP,
        user_roles: UR,
        events: Arc<dyn EventSink>,
        cache: Arc<dyn DecisionCache>,
    ) -> Self {
        Self {
            roles,
            permissions,
            role_permissions,
            user_roles,
            events,
            cache,
        }
    }

    /// Seeds the permission catalog the default roles draw from.
    /// `find_or_create` keyed on `(resource_type, action)` keeps this
    /// idempotent across restarts.
    pub async fn seed_permission_catalog(&self) -> VerdictResult<u64> {
        let mut resource_types: Vec<&str> = DEFAULT_ROLES
            .iter()
            .flat_map(|def| def.resource_types.iter().copied())
            .collect();
        resource_types.sort_unstable();
        resource_types.dedup();

        let mut seeded = 0u64;
        for resource_type in resource_types {
            let actions = BASE_ACTIONS
                .iter()
                .chain(extra_actions_for(resource_type));
            for action in actions {
                self.permissions
                    .find_or_create(CreatePermission {
                        resource_type: resource_type.to_string(),
                        action: (*action).to_string(),
                        description: format!("{action} on {resource_type}"),
                        risk_level: risk_level_for(action),
                        requires_mfa: false,
                        requires_approval: false,
                        is_system: true,
                    })
                    .await?;
                seeded += 1;
            }
        }

        info!(seeded, "Permission catalog seeded");
        Ok(seeded)
    }

    /// Materializes the default role set for a tenant. Roles that
    /// already exist are left untouched.
    pub async fn provision_tenant(
        &self,
        tenant_id: Uuid,
        correlation_id: &str,
    ) -> VerdictResult<()> {
        info!(tenant_id = %tenant_id, correlation_id, "Provisioning default roles");

        let mut created_roles = 0u32;
        let mut assigned_permissions = 0u32;

        for definition in DEFAULT_ROLES {
            let role = match self
                .roles
                .create(CreateRole {
                    tenant_id: Some(tenant_id),
                    name: definition.name.to_string(),
                    description: definition.description.to_string(),
                    priority: definition.priority,
                    max_users: None,
                    is_system: true,
                    parent_role_id: None,
                    created_by: SYSTEM_ACTOR.to_string(),
                })
                .await
            {
                Ok(role) => role,
                Err(VerdictError::Duplicate { .. }) => {
                    debug!(
                        tenant_id = %tenant_id,
                        role = definition.name,
                        "Role already provisioned, skipping"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            created_roles += 1;

            assigned_permissions += self.grant_scope(&role.id, definition).await?;
        }

        self.cache.invalidate_all().await;
        info!(
            tenant_id = %tenant_id,
            created_roles,
            assigned_permissions,
            correlation_id,
            "Default roles provisioned"
        );
        Ok(())
    }

    /// Looks up the tenant's `TENANT_ADMIN` role and assigns it to the
    /// user. A missing admin role is a logical impossibility after
    /// provisioning and is reported as `NotFound`.
    pub async fn assign_tenant_admin(&self, tenant_id: Uuid, user_id: Uuid) -> VerdictResult<()> {
        let admin_role = self
            .roles
            .get_by_name(Some(tenant_id), TENANT_ADMIN_ROLE)
            .await?;
        if !admin_role.is_active {
            return Err(VerdictError::NotFound {
                entity: "active TENANT_ADMIN role".into(),
                id: tenant_id.to_string(),
            });
        }

        if let Some(existing) = self
            .user_roles
            .find(user_id, admin_role.id, tenant_id)
            .await?
            && existing.is_active
        {
            info!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                "TENANT_ADMIN already assigned, skipping"
            );
            return Ok(());
        }

        match self
            .user_roles
            .create(CreateUserRole {
                user_id,
                role_id: admin_role.id,
                tenant_id,
                assigned_by: SYSTEM_ACTOR.to_string(),
                expires_at: None,
            })
            .await
        {
            Ok(_) => {}
            // A concurrent delivery won the race; the assignment exists.
            Err(VerdictError::Duplicate { .. }) => {
                info!(user_id = %user_id, "TENANT_ADMIN assignment raced, absorbing");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.cache.invalidate_user(user_id, tenant_id).await;
        self.events
            .publish(AuthzEvent::RoleAssigned {
                user_id,
                role_id: admin_role.id,
                tenant_id,
                role_name: TENANT_ADMIN_ROLE.to_string(),
                assigned_by: SYSTEM_ACTOR.to_string(),
            })
            .await;

        info!(user_id = %user_id, tenant_id = %tenant_id, "TENANT_ADMIN assigned");
        Ok(())
    }

    /// Deactivates every active role of the tenant.
    pub async fn deactivate_tenant(
        &self,
        tenant_id: Uuid,
        correlation_id: &str,
    ) -> VerdictResult<u64> {
        info!(tenant_id = %tenant_id, correlation_id, "Deactivating tenant authorization");

        let roles = self.roles.list_active_by_tenant(tenant_id).await?;
        let mut deactivated = 0u64;
        for role in &roles {
            self.roles.set_active(role.id, false).await?;
            deactivated += 1;
        }

        self.cache.invalidate_all().await;
        info!(tenant_id = %tenant_id, deactivated, "Tenant roles deactivated");
        Ok(deactivated)
    }

    async fn grant_scope(
        &self,
        role_id: &Uuid,
        definition: &RoleDefinition,
    ) -> VerdictResult<u32> {
        let scope: Vec<String> = definition
            .resource_types
            .iter()
            .map(|t| (*t).to_string())
            .collect();
        let in_scope: Vec<Permission> =
            self.permissions.list_by_resource_types(&scope).await?;

        let mut granted = 0u32;
        for permission in in_scope {
            if !definition.filter.accepts(&permission.action) {
                continue;
            }

            match self
                .role_permissions
                .create(CreateRolePermission {
                    role_id: *role_id,
                    permission_id: permission.id,
                    constraints: None,
                    granted_by: SYSTEM_ACTOR.to_string(),
                    expires_at: None,
                })
                .await
            {
                Ok(_) => granted += 1,
                Err(VerdictError::Duplicate { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        debug!(role = definition.name, granted, "Scope permissions granted");
        Ok(granted)
    }
}

#[async_trait]
impl<R, P, RP, UR> TenantLifecycleHandler for TenantSyncService<R, P, RP, UR>
where
    R: RoleRepository,
    P: PermissionRepository,
    RP: RolePermissionRepository,
    UR: UserRoleRepository,
{
    async fn tenant_created(
        &self,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        correlation_id: &str,
    ) -> Result<(), HandlerError> {
        self.provision_tenant(tenant_id, correlation_id)
            .await
            .map_err(classify)?;

        match user_id {
            Some(user_id) => self
                .assign_tenant_admin(tenant_id, user_id)
                .await
                .map_err(classify),
            None => {
                warn!(
                    tenant_id = %tenant_id,
                    "No user in tenant-created event, skipping TENANT_ADMIN assignment"
                );
                Ok(())
            }
        }
    }

    async fn tenant_deactivated(
        &self,
        tenant_id: Uuid,
        correlation_id: &str,
    ) -> Result<(), HandlerError> {
        self.deactivate_tenant(tenant_id, correlation_id)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

/// Consumer-side error classification: logical impossibilities drop the
/// message, store trouble retries it.
fn classify(error: VerdictError) -> HandlerError {
    match error {
        VerdictError::NotFound { .. }
        | VerdictError::Validation { .. }
        | VerdictError::BusinessRule { .. }
        | VerdictError::TenantIsolation { .. } => HandlerError::NonRetryable(error.to_string()),
        other => HandlerError::Retryable(other.to_string()),
    }
}

fn risk_level_for(action: &str) -> RiskLevel {
    match action {
        "DELETE" | "MANAGE" => RiskLevel::High,
        "DEPLOY" | "CONFIGURE" | "APPROVE" => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_select_expected_actions() {
        let all_except = ActionFilter::AllExcept(&["DELETE_TENANT"]);
        assert!(all_except.accepts("READ"));
        assert!(all_except.accepts("DELETE"));
        assert!(!all_except.accepts("DELETE_TENANT"));

        let only = ActionFilter::Only(&["READ", "VIEW"]);
        assert!(only.accepts("READ"));
        assert!(!only.accepts("DELETE"));

        let exclude_prefixed = ActionFilter::ExcludePrefixed {
            prefixes: &["ADMIN_"],
            actions: &["DELETE_TENANT"],
        };
        assert!(exclude_prefixed.accepts("EXECUTE"));
        assert!(!exclude_prefixed.accepts("ADMIN_RESET"));
        assert!(!exclude_prefixed.accepts("DELETE_TENANT"));
    }

    #[test]
    fn default_role_set_shape() {
        assert_eq!(DEFAULT_ROLES.len(), 13);
        assert!(DEFAULT_ROLES.iter().any(|d| d.name == "TENANT_ADMIN" && d.priority == 1000));
        assert!(DEFAULT_ROLES.iter().any(|d| d.name == "VIEWER" && d.priority == 100));

        // Names are unique.
        let mut names: Vec<&str> = DEFAULT_ROLES.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 13);
    }
}
