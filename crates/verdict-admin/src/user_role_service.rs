//! User-role assignment service.
//!
//! Assignments and revocations are the mutations with a precisely known
//! blast radius, so they invalidate the decision cache per
//! `(user, tenant)` instead of globally.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::user_role::{CreateUserRole, UserRole};
use verdict_core::repository::{RoleRepository, UserRoleRepository};
use verdict_engine::DecisionCache;
use verdict_events::{AuthzEvent, EventSink};

/// Input for a role assignment.
#[derive(Debug, Clone)]
pub struct AssignRoleInput {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    pub assigned_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct UserRoleService<UR, R> {
    user_roles: UR,
    roles: R,
    events: Arc<dyn EventSink>,
    cache: Arc<dyn DecisionCache>,
}

impl<UR, R> UserRoleService<UR, R>
where
    UR: UserRoleRepository,
    R: RoleRepository,
{
    pub fn new(
        user_roles: UR,
        roles: R,
        events: Arc<dyn EventSink>,
        cache: Arc<dyn DecisionCache>,
    ) -> Self {
        Self {
            user_roles,
            roles,
            events,
            cache,
        }
    }

    /// Assign a role to a user, enforcing assignment uniqueness and the
    /// role's `max_users` cap.
    pub async fn assign(&self, input: AssignRoleInput) -> VerdictResult<UserRole> {
        info!(
            user_id = %input.user_id,
            role_id = %input.role_id,
            tenant_id = %input.tenant_id,
            "Assigning role"
        );

        if let Some(existing) = self
            .user_roles
            .find(input.user_id, input.role_id, input.tenant_id)
            .await?
            && existing.is_active
        {
            return Err(VerdictError::Duplicate {
                entity: "user role assignment".into(),
            });
        }

        let role = self.roles.get_by_id(input.role_id).await?;
        if let Some(max_users) = role.max_users {
            let current = self.user_roles.count_active_for_role(role.id).await?;
            if current >= u64::from(max_users) {
                return Err(VerdictError::BusinessRule {
                    message: format!("Role has reached its maximum of {max_users} users"),
                });
            }
        }

        if let Some(at) = input.expires_at
            && at <= Utc::now()
        {
            return Err(VerdictError::Validation {
                message: "Assignment expiry must be in the future".into(),
            });
        }

        let assignment = self
            .user_roles
            .create(CreateUserRole {
                user_id: input.user_id,
                role_id: input.role_id,
                tenant_id: input.tenant_id,
                assigned_by: input.assigned_by.clone(),
                expires_at: input.expires_at,
            })
            .await?;

        self.cache
            .invalidate_user(input.user_id, input.tenant_id)
            .await;
        self.events
            .publish(AuthzEvent::RoleAssigned {
                user_id: input.user_id,
                role_id: input.role_id,
                tenant_id: input.tenant_id,
                role_name: role.name,
                assigned_by: input.assigned_by,
            })
            .await;

        info!(assignment_id = %assignment.id, "Role assigned");
        Ok(assignment)
    }

    /// Revoke a role from a user (deactivates the assignment).
    pub async fn revoke(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Uuid,
        revoked_by: &str,
    ) -> VerdictResult<()> {
        info!(user_id = %user_id, role_id = %role_id, "Revoking role");

        let assignment = self
            .user_roles
            .find(user_id, role_id, tenant_id)
            .await?
            .ok_or_else(|| VerdictError::NotFound {
                entity: "user role assignment".into(),
                id: format!("{user_id}:{role_id}"),
            })?;

        self.user_roles.set_active(assignment.id, false).await?;

        self.cache.invalidate_user(user_id, tenant_id).await;
        self.events
            .publish(AuthzEvent::RoleRevoked {
                user_id,
                role_id,
                tenant_id,
                revoked_by: revoked_by.to_string(),
            })
            .await;

        info!(user_id = %user_id, role_id = %role_id, "Role revoked");
        Ok(())
    }

    /// Active assignments for a user in a tenant.
    pub async fn user_roles(&self, user_id: Uuid, tenant_id: Uuid) -> VerdictResult<Vec<UserRole>> {
        self.user_roles.list_active_by_user(user_id, tenant_id).await
    }

    /// Active assignments for a user across every tenant.
    pub async fn roles_across_tenants(&self, user_id: Uuid) -> VerdictResult<Vec<UserRole>> {
        self.user_roles.list_active_by_user_all_tenants(user_id).await
    }

    /// Active assignments of a role within a tenant.
    pub async fn users_with_role(
        &self,
        role_id: Uuid,
        tenant_id: Uuid,
    ) -> VerdictResult<Vec<UserRole>> {
        self.user_roles.list_active_by_role(role_id, tenant_id).await
    }

    pub async fn user_has_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Uuid,
    ) -> VerdictResult<bool> {
        Ok(self
            .user_roles
            .find(user_id, role_id, tenant_id)
            .await?
            .is_some_and(|assignment| assignment.is_live(Utc::now())))
    }
}
