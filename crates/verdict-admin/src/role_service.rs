//! Role management service.
//!
//! Enforces the role invariants: `(name, tenant)` uniqueness, hierarchy
//! depth and same-tenant parentage, the per-role permission cap,
//! `max_users` floors, and system-role protection.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::permission::Permission;
use verdict_core::models::role::{CreateRole, Role, UpdateRole};
use verdict_core::models::role_permission::{CreateRolePermission, RolePermission};
use verdict_core::repository::{
    PermissionRepository, RolePermissionRepository, RoleRepository, UserRoleRepository,
};
use verdict_engine::DecisionCache;
use verdict_events::{AuthzEvent, EventSink};

/// Configurable bounds on the role model.
#[derive(Debug, Clone)]
pub struct RoleLimits {
    pub max_hierarchy_depth: usize,
    pub max_permissions_per_role: u64,
}

impl Default for RoleLimits {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: 10,
            max_permissions_per_role: 100,
        }
    }
}

/// Input for role creation.
#[derive(Debug, Clone)]
pub struct CreateRoleInput {
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub priority: Option<i32>,
    pub max_users: Option<u32>,
    pub parent_role_id: Option<Uuid>,
    pub permission_ids: Vec<Uuid>,
    pub created_by: String,
}

/// Input for role updates. `expected_version` carries the optimistic
/// lock; `allow_system_update` is the explicit override for system roles.
#[derive(Debug, Clone, Default)]
pub struct UpdateRoleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub max_users: Option<u32>,
    pub is_active: Option<bool>,
    pub allow_system_update: bool,
    pub updated_by: String,
    pub expected_version: u64,
}

/// A role with its current active-user count.
#[derive(Debug, Clone)]
pub struct RoleWithUsage {
    pub role: Role,
    pub active_users: u64,
}

/// A role, its ordered ancestor chain, direct children, and the union of
/// inherited permissions.
#[derive(Debug, Clone)]
pub struct RoleHierarchy {
    pub role: Role,
    pub parent_chain: Vec<Role>,
    pub children: Vec<Role>,
    pub all_permissions: Vec<Permission>,
}

/// Aggregate counts for one role.
#[derive(Debug, Clone)]
pub struct RoleStatistics {
    pub total_permissions: u64,
    pub active_users: u64,
    pub child_roles: u64,
}

pub struct RoleService<R, P, RP, UR> {
    roles: R,
    permissions: P,
    role_permissions: RP,
    user_roles: UR,
    events: Arc<dyn EventSink>,
    cache: Arc<dyn DecisionCache>,
    limits: RoleLimits,
}

impl<R, P, RP, UR> RoleService<R, P, RP, UR>
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
        limits: RoleLimits,
    ) -> Self {
        Self {
            roles,
            permissions,
            role_permissions,
            user_roles,
            events,
            cache,
            limits,
        }
    }

    /// Create a new (non-system) role.
    pub async fn create(&self, input: CreateRoleInput) -> VerdictResult<Role> {
        info!(name = %input.name, tenant_id = ?input.tenant_id, "Creating role");

        validate_name(&input.name)?;
        validate_description(&input.description)?;
        let priority = input.priority.unwrap_or(100);
        validate_priority(priority)?;

        if self
            .roles
            .exists_by_name(input.tenant_id, &input.name)
            .await?
        {
            return Err(VerdictError::Duplicate {
                entity: format!("role '{}'", input.name),
            });
        }

        if let Some(parent_id) = input.parent_role_id {
            let parent = self.roles.get_by_id(parent_id).await?;
            if parent.tenant_id != input.tenant_id {
                return Err(VerdictError::Validation {
                    message: "Parent role must be in the same tenant".into(),
                });
            }
            self.validate_hierarchy_depth(&parent).await?;
        }

        let role = self
            .roles
            .create(CreateRole {
                tenant_id: input.tenant_id,
                name: input.name,
                description: input.description,
                priority,
                max_users: input.max_users,
                is_system: false,
                parent_role_id: input.parent_role_id,
                created_by: input.created_by.clone(),
            })
            .await?;

        if !input.permission_ids.is_empty() {
            self.assign_permissions(role.id, &input.permission_ids, &input.created_by)
                .await?;
        }

        self.cache.invalidate_all().await;
        self.events
            .publish(AuthzEvent::RoleCreated {
                role_id: role.id,
                tenant_id: role.tenant_id,
                role_name: role.name.clone(),
                created_by: input.created_by,
            })
            .await;

        info!(role_id = %role.id, "Role created");
        Ok(role)
    }

    /// Update an existing role, recording a field-change map.
    pub async fn update(&self, role_id: Uuid, input: UpdateRoleInput) -> VerdictResult<Role> {
        info!(role_id = %role_id, "Updating role");

        let role = self.roles.get_by_id(role_id).await?;

        if role.is_system && !input.allow_system_update {
            return Err(VerdictError::BusinessRule {
                message: "System roles cannot be modified".into(),
            });
        }

        let mut changes = BTreeMap::new();
        let mut update = UpdateRole {
            updated_by: Some(input.updated_by.clone()),
            ..Default::default()
        };

        if let Some(name) = input.name
            && name != role.name
        {
            validate_name(&name)?;
            if self.roles.exists_by_name(role.tenant_id, &name).await? {
                return Err(VerdictError::Duplicate {
                    entity: format!("role '{name}'"),
                });
            }
            changes.insert("name".to_string(), format!("{} -> {}", role.name, name));
            update.name = Some(name);
        }

        if let Some(description) = input.description
            && description != role.description
        {
            validate_description(&description)?;
            changes.insert(
                "description".to_string(),
                format!("{} -> {}", role.description, description),
            );
            update.description = Some(description);
        }

        if let Some(priority) = input.priority
            && priority != role.priority
        {
            validate_priority(priority)?;
            changes.insert(
                "priority".to_string(),
                format!("{} -> {}", role.priority, priority),
            );
            update.priority = Some(priority);
        }

        if let Some(max_users) = input.max_users
            && Some(max_users) != role.max_users
        {
            let current = self.user_roles.count_active_for_role(role_id).await?;
            if u64::from(max_users) < current {
                return Err(VerdictError::BusinessRule {
                    message: format!(
                        "Cannot set max users to {max_users}: role currently has {current} users"
                    ),
                });
            }
            changes.insert(
                "max_users".to_string(),
                format!(
                    "{} -> {}",
                    role.max_users
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "none".into()),
                    max_users
                ),
            );
            update.max_users = Some(Some(max_users));
        }

        if let Some(is_active) = input.is_active
            && is_active != role.is_active
        {
            changes.insert(
                "is_active".to_string(),
                format!("{} -> {}", role.is_active, is_active),
            );
            update.is_active = Some(is_active);
        }

        if changes.is_empty() {
            return Ok(role);
        }

        let updated = self
            .roles
            .update(role_id, input.expected_version, update)
            .await?;

        self.cache.invalidate_all().await;
        self.events
            .publish(AuthzEvent::RoleUpdated {
                role_id,
                tenant_id: updated.tenant_id,
                changes,
                updated_by: input.updated_by,
            })
            .await;

        info!(role_id = %role_id, "Role updated");
        Ok(updated)
    }

    /// Role with its current active-user count.
    pub async fn get(&self, role_id: Uuid) -> VerdictResult<RoleWithUsage> {
        let role = self.roles.get_by_id(role_id).await?;
        let active_users = self.user_roles.count_active_for_role(role_id).await?;
        Ok(RoleWithUsage { role, active_users })
    }

    pub async fn get_by_name(&self, tenant_id: Option<Uuid>, name: &str) -> VerdictResult<Role> {
        self.roles.get_by_name(tenant_id, name).await
    }

    pub async fn tenant_roles(&self, tenant_id: Uuid) -> VerdictResult<Vec<Role>> {
        self.roles.list_active_by_tenant(tenant_id).await
    }

    pub async fn system_roles(&self, tenant_id: Uuid) -> VerdictResult<Vec<Role>> {
        self.roles.list_system_by_tenant(tenant_id).await
    }

    /// Delete a role. Refused for system roles, roles with active user
    /// assignments, and roles that still have children.
    pub async fn delete(&self, role_id: Uuid, deleted_by: &str) -> VerdictResult<()> {
        info!(role_id = %role_id, "Deleting role");

        let role = self.roles.get_by_id(role_id).await?;

        if role.is_system {
            return Err(VerdictError::BusinessRule {
                message: "System roles cannot be deleted".into(),
            });
        }

        let user_count = self.user_roles.count_active_for_role(role_id).await?;
        if user_count > 0 {
            return Err(VerdictError::BusinessRule {
                message: format!("Cannot delete role: {user_count} users are assigned to it"),
            });
        }

        let children = self.roles.find_children(role_id).await?;
        if !children.is_empty() {
            return Err(VerdictError::BusinessRule {
                message: format!("Cannot delete role: it has {} child roles", children.len()),
            });
        }

        self.roles.delete(role_id).await?;

        self.cache.invalidate_all().await;
        self.events
            .publish(AuthzEvent::RoleDeleted {
                role_id,
                tenant_id: role.tenant_id,
                deleted_by: deleted_by.to_string(),
            })
            .await;

        info!(role_id = %role_id, "Role deleted");
        Ok(())
    }

    /// Deep-copy a role: same permissions, shared parent, never system.
    pub async fn clone_role(
        &self,
        source_role_id: Uuid,
        new_name: &str,
        tenant_id: Option<Uuid>,
        created_by: &str,
    ) -> VerdictResult<Role> {
        info!(source = %source_role_id, new_name, "Cloning role");

        let source = self.roles.get_by_id(source_role_id).await?;

        if self.roles.exists_by_name(tenant_id, new_name).await? {
            return Err(VerdictError::Duplicate {
                entity: format!("role '{new_name}'"),
            });
        }

        let cloned = self
            .roles
            .create(CreateRole {
                tenant_id,
                name: new_name.to_string(),
                description: format!("{} (cloned)", source.description),
                priority: source.priority,
                max_users: source.max_users,
                is_system: false,
                parent_role_id: source.parent_role_id,
                created_by: created_by.to_string(),
            })
            .await?;

        let source_grants = self.role_permissions.list_by_role(source_role_id).await?;
        let permission_ids: Vec<Uuid> =
            source_grants.iter().map(|g| g.permission_id).collect();
        if !permission_ids.is_empty() {
            self.assign_permissions(cloned.id, &permission_ids, created_by)
                .await?;
        }

        info!(role_id = %cloned.id, "Role cloned");
        Ok(cloned)
    }

    /// Assign permissions to a role. Already-present pairs are skipped;
    /// the per-role cap counts existing plus new grants.
    pub async fn assign_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        assigned_by: &str,
    ) -> VerdictResult<()> {
        info!(role_id = %role_id, count = permission_ids.len(), "Assigning permissions");

        let role = self.roles.get_by_id(role_id).await?;

        let existing = self.role_permissions.count_by_role(role_id).await?;
        if existing + permission_ids.len() as u64 > self.limits.max_permissions_per_role {
            return Err(VerdictError::BusinessRule {
                message: format!(
                    "Role cannot have more than {} permissions",
                    self.limits.max_permissions_per_role
                ),
            });
        }

        let mut assigned = 0u32;
        for permission_id in permission_ids {
            if self.role_permissions.exists(role_id, *permission_id).await? {
                continue;
            }

            let permission = self.permissions.get_by_id(*permission_id).await?;

            self.role_permissions
                .create(CreateRolePermission {
                    role_id,
                    permission_id: *permission_id,
                    constraints: None,
                    granted_by: assigned_by.to_string(),
                    expires_at: None,
                })
                .await?;
            assigned += 1;

            self.events
                .publish(AuthzEvent::PermissionGranted {
                    role_id,
                    tenant_id: role.tenant_id,
                    permission_id: *permission_id,
                    resource_type: permission.resource_type,
                    action: permission.action,
                    granted_by: assigned_by.to_string(),
                })
                .await;
        }

        if assigned > 0 {
            self.cache.invalidate_all().await;
            info!(role_id = %role_id, assigned, "Permissions assigned");
        }

        Ok(())
    }

    pub async fn remove_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        removed_by: &str,
    ) -> VerdictResult<()> {
        info!(role_id = %role_id, permission_id = %permission_id, "Removing permission");

        self.role_permissions.remove(role_id, permission_id).await?;
        self.cache.invalidate_all().await;

        self.events
            .publish(AuthzEvent::PermissionRevoked {
                role_id,
                permission_id,
                revoked_by: removed_by.to_string(),
            })
            .await;

        Ok(())
    }

    /// Remove every permission from a (non-system) role.
    pub async fn remove_all_permissions(&self, role_id: Uuid) -> VerdictResult<()> {
        let role = self.roles.get_by_id(role_id).await?;
        if role.is_system {
            return Err(VerdictError::BusinessRule {
                message: "Cannot remove permissions from a system role".into(),
            });
        }

        self.role_permissions.remove_all_for_role(role_id).await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    /// Set (or clear) the expiry of a role-permission grant. An expiry
    /// must lie in the future.
    pub async fn set_permission_expiration(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> VerdictResult<()> {
        if let Some(at) = expires_at
            && at <= Utc::now()
        {
            return Err(VerdictError::Validation {
                message: "Expiration time must be in the future".into(),
            });
        }

        self.role_permissions
            .set_expiration(role_id, permission_id, expires_at)
            .await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    pub async fn update_permission_constraints(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        constraints: serde_json::Value,
    ) -> VerdictResult<()> {
        self.role_permissions
            .update_constraints(role_id, permission_id, constraints)
            .await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    /// Grants on the role expiring within the window.
    pub async fn expiring_permissions(
        &self,
        role_id: Uuid,
        days_ahead: i64,
    ) -> VerdictResult<Vec<RolePermission>> {
        let now = Utc::now();
        self.role_permissions
            .find_expiring(role_id, now, now + Duration::days(days_ahead))
            .await
    }

    /// All permissions of a role including those inherited through the
    /// parent chain. The walk carries a visited set so a malformed cycle
    /// cannot loop.
    pub async fn permissions_including_inherited(
        &self,
        role_id: Uuid,
    ) -> VerdictResult<Vec<Permission>> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut collected: Vec<Permission> = Vec::new();
        let mut seen_permissions: HashSet<Uuid> = HashSet::new();

        let mut current = Some(self.roles.get_by_id(role_id).await?);
        while let Some(role) = current {
            if !visited.insert(role.id) {
                break;
            }

            for grant in self.role_permissions.list_active_grants(role.id).await? {
                if seen_permissions.insert(grant.permission.id) {
                    collected.push(grant.permission);
                }
            }

            current = match role.parent_role_id {
                Some(parent_id) if visited.len() <= self.limits.max_hierarchy_depth => {
                    Some(self.roles.get_by_id(parent_id).await?)
                }
                _ => None,
            };
        }

        Ok(collected)
    }

    /// The role, its ordered ancestor chain, its direct children, and
    /// the union of inherited permissions.
    pub async fn hierarchy(&self, role_id: Uuid) -> VerdictResult<RoleHierarchy> {
        let role = self.roles.get_by_id(role_id).await?;

        let mut parent_chain = Vec::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        visited.insert(role.id);

        let mut next_parent = role.parent_role_id;
        while let Some(parent_id) = next_parent {
            if !visited.insert(parent_id) || parent_chain.len() >= self.limits.max_hierarchy_depth
            {
                break;
            }
            let parent = self.roles.get_by_id(parent_id).await?;
            next_parent = parent.parent_role_id;
            parent_chain.push(parent);
        }

        let children = self.roles.find_children(role_id).await?;
        let all_permissions = self.permissions_including_inherited(role_id).await?;

        Ok(RoleHierarchy {
            role,
            parent_chain,
            children,
            all_permissions,
        })
    }

    pub async fn statistics(&self, role_id: Uuid) -> VerdictResult<RoleStatistics> {
        let total_permissions = self.role_permissions.count_by_role(role_id).await?;
        let active_users = self.user_roles.count_active_for_role(role_id).await?;
        let child_roles = self.roles.find_children(role_id).await?.len() as u64;

        Ok(RoleStatistics {
            total_permissions,
            active_users,
            child_roles,
        })
    }

    /// Refuses a parent whose chain is already at the depth bound.
    async fn validate_hierarchy_depth(&self, parent: &Role) -> VerdictResult<()> {
        let mut depth = 1;
        let mut visited: HashSet<Uuid> = HashSet::new();
        visited.insert(parent.id);

        let mut next_parent = parent.parent_role_id;
        while let Some(parent_id) = next_parent {
            depth += 1;
            if depth >= self.limits.max_hierarchy_depth || !visited.insert(parent_id) {
                return Err(VerdictError::BusinessRule {
                    message: format!(
                        "Role hierarchy cannot exceed {} levels",
                        self.limits.max_hierarchy_depth
                    ),
                });
            }
            next_parent = self.roles.get_by_id(parent_id).await?.parent_role_id;
        }

        Ok(())
    }
}

fn validate_name(name: &str) -> VerdictResult<()> {
    if name.is_empty() || name.len() > 100 {
        return Err(VerdictError::Validation {
            message: "Role name must be 1-100 characters".into(),
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> VerdictResult<()> {
    if description.len() > 500 {
        return Err(VerdictError::Validation {
            message: "Role description must be at most 500 characters".into(),
        });
    }
    Ok(())
}

fn validate_priority(priority: i32) -> VerdictResult<()> {
    if !(1..=10_000).contains(&priority) {
        return Err(VerdictError::Validation {
            message: "Role priority must be between 1 and 10000".into(),
        });
    }
    Ok(())
}
