//! Cross-tenant access service.
//!
//! Explicit grants letting a source tenant act on a target tenant's
//! resources of one type.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::cross_tenant::{CreateCrossTenantAccess, CrossTenantAccess};
use verdict_core::repository::CrossTenantAccessRepository;
use verdict_engine::DecisionCache;
use verdict_events::{AuthzEvent, EventSink};

pub struct CrossTenantAccessService<CT> {
    access: CT,
    events: Arc<dyn EventSink>,
    cache: Arc<dyn DecisionCache>,
}

impl<CT: CrossTenantAccessRepository> CrossTenantAccessService<CT> {
    pub fn new(
        access: CT,
        events: Arc<dyn EventSink>,
        cache: Arc<dyn DecisionCache>,
    ) -> Self {
        Self {
            access,
            events,
            cache,
        }
    }

    /// Grant cross-tenant access. One active grant per
    /// `(source, target, resource_type)`.
    pub async fn grant(&self, input: CreateCrossTenantAccess) -> VerdictResult<CrossTenantAccess> {
        info!(
            source = %input.source_tenant_id,
            target = %input.target_tenant_id,
            resource_type = %input.resource_type,
            "Granting cross-tenant access"
        );

        if input.source_tenant_id == input.target_tenant_id {
            return Err(VerdictError::Validation {
                message: "Source and target tenant cannot be the same".into(),
            });
        }
        if input.permissions.is_empty() {
            return Err(VerdictError::Validation {
                message: "At least one permission must be specified".into(),
            });
        }

        if self
            .access
            .exists_active(
                input.source_tenant_id,
                input.target_tenant_id,
                &input.resource_type,
            )
            .await?
        {
            return Err(VerdictError::Duplicate {
                entity: "cross-tenant access".into(),
            });
        }

        let granted_by = input.granted_by.clone();
        let grant = self.access.create(input).await?;

        self.cache.invalidate_all().await;
        self.events
            .publish(AuthzEvent::CrossTenantAccessGranted {
                source_tenant_id: grant.source_tenant_id,
                target_tenant_id: grant.target_tenant_id,
                resource_type: grant.resource_type.clone(),
                granted_by,
            })
            .await;

        Ok(grant)
    }

    /// Revoke a grant: deactivates it and stamps the revocation.
    pub async fn revoke(&self, access_id: Uuid, revoked_by: &str) -> VerdictResult<()> {
        info!(access_id = %access_id, "Revoking cross-tenant access");

        let grant = self.access.get_by_id(access_id).await?;
        self.access
            .revoke(access_id, revoked_by, Utc::now())
            .await?;

        self.cache.invalidate_all().await;
        self.events
            .publish(AuthzEvent::CrossTenantAccessRevoked {
                source_tenant_id: grant.source_tenant_id,
                target_tenant_id: grant.target_tenant_id,
                resource_type: grant.resource_type,
                revoked_by: revoked_by.to_string(),
            })
            .await;

        Ok(())
    }

    /// True iff an active, unexpired grant covers the action.
    pub async fn check(
        &self,
        source_tenant_id: Uuid,
        target_tenant_id: Uuid,
        resource_type: &str,
        action: &str,
    ) -> VerdictResult<bool> {
        let grants = self
            .access
            .find_active(source_tenant_id, target_tenant_id, resource_type)
            .await?;

        let now = Utc::now();
        Ok(grants
            .iter()
            .any(|g| g.is_live(now) && g.permissions.iter().any(|p| p == action)))
    }

    /// Every active grant touching the tenant, as source or target.
    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> VerdictResult<Vec<CrossTenantAccess>> {
        self.access.list_active_by_tenant(tenant_id).await
    }
}
