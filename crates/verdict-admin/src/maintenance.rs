//! Scheduled maintenance sweeps.
//!
//! Each operation deactivates one kind of expired state, reports the
//! affected count, and invalidates the decision cache when anything
//! changed. The scheduler runs them together through [`sweep`].
//!
//! [`sweep`]: MaintenanceService::sweep

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use verdict_core::error::VerdictResult;
use verdict_core::repository::{
    CrossTenantAccessRepository, PolicyRepository, RolePermissionRepository, UserRoleRepository,
};
use verdict_engine::DecisionCache;

/// Counts from one full sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub expired_policies: u64,
    pub expired_role_permissions: u64,
    pub expired_user_roles: u64,
    pub expired_cross_tenant_grants: u64,
}

pub struct MaintenanceService<POL, RP, UR, CT> {
    policies: POL,
    role_permissions: RP,
    user_roles: UR,
    cross_tenant: CT,
    cache: Arc<dyn DecisionCache>,
}

impl<POL, RP, UR, CT> MaintenanceService<POL, RP, UR, CT>
where
    POL: PolicyRepository,
    RP: RolePermissionRepository,
    UR: UserRoleRepository,
    CT: CrossTenantAccessRepository,
{
    pub fn new(
        policies: POL,
        role_permissions: RP,
        user_roles: UR,
        cross_tenant: CT,
        cache: Arc<dyn DecisionCache>,
    ) -> Self {
        Self {
            policies,
            role_permissions,
            user_roles,
            cross_tenant,
            cache,
        }
    }

    /// Marks policies whose end date has passed as inactive.
    pub async fn deactivate_expired_policies(&self, now: DateTime<Utc>) -> VerdictResult<u64> {
        let count = self.policies.deactivate_expired(now).await?;
        if count > 0 {
            self.cache.invalidate_all().await;
            info!(count, "Deactivated expired policies");
        }
        Ok(count)
    }

    /// Removes role-permission grants whose expiry has passed.
    pub async fn deactivate_expired_role_permissions(
        &self,
        now: DateTime<Utc>,
    ) -> VerdictResult<u64> {
        let count = self.role_permissions.delete_expired(now).await?;
        if count > 0 {
            self.cache.invalidate_all().await;
            info!(count, "Removed expired role-permission grants");
        }
        Ok(count)
    }

    /// Deactivates user-role assignments whose expiry has passed.
    pub async fn deactivate_expired_user_roles(&self, now: DateTime<Utc>) -> VerdictResult<u64> {
        let count = self.user_roles.deactivate_expired(now).await?;
        if count > 0 {
            self.cache.invalidate_all().await;
            info!(count, "Deactivated expired user-role assignments");
        }
        Ok(count)
    }

    /// Deactivates cross-tenant grants whose expiry has passed.
    pub async fn deactivate_expired_cross_tenant_grants(
        &self,
        now: DateTime<Utc>,
    ) -> VerdictResult<u64> {
        let count = self.cross_tenant.deactivate_expired(now).await?;
        if count > 0 {
            self.cache.invalidate_all().await;
            info!(count, "Deactivated expired cross-tenant grants");
        }
        Ok(count)
    }

    /// Runs every sweep once, against a single observation of the clock.
    pub async fn sweep(&self) -> VerdictResult<SweepReport> {
        let now = Utc::now();

        let report = SweepReport {
            expired_policies: self.deactivate_expired_policies(now).await?,
            expired_role_permissions: self.deactivate_expired_role_permissions(now).await?,
            expired_user_roles: self.deactivate_expired_user_roles(now).await?,
            expired_cross_tenant_grants: self
                .deactivate_expired_cross_tenant_grants(now)
                .await?,
        };

        info!(
            expired_policies = report.expired_policies,
            expired_role_permissions = report.expired_role_permissions,
            expired_user_roles = report.expired_user_roles,
            expired_cross_tenant_grants = report.expired_cross_tenant_grants,
            "Maintenance sweep finished"
        );

        Ok(report)
    }
}
