//! Integration tests for cross-tenant access grants and the
//! maintenance sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use verdict_admin::{CrossTenantAccessService, MaintenanceService};
use verdict_core::error::VerdictError;
use verdict_core::models::cross_tenant::CreateCrossTenantAccess;
use verdict_core::models::permission::{CreatePermission, RiskLevel};
use verdict_core::models::policy::{CreatePolicy, PolicyEffect, PolicyType};
use verdict_core::models::role::CreateRole;
use verdict_core::models::role_permission::CreateRolePermission;
use verdict_core::models::user_role::CreateUserRole;
use verdict_core::repository::{
    CrossTenantAccessRepository, PermissionRepository, PolicyRepository,
    RolePermissionRepository, RoleRepository, UserRoleRepository,
};
use verdict_db::{
    SurrealCrossTenantAccessRepository, SurrealPermissionRepository, SurrealPolicyRepository,
    SurrealRolePermissionRepository, SurrealRoleRepository, SurrealUserRoleRepository,
};
use verdict_engine::MemoryDecisionCache;
use verdict_events::MemoryEventSink;

async fn setup() -> (
    Surreal<Db>,
    CrossTenantAccessService<SurrealCrossTenantAccessRepository<Db>>,
) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    verdict_db::run_migrations(&db).await.unwrap();

    let service = CrossTenantAccessService::new(
        SurrealCrossTenantAccessRepository::new(db.clone()),
        Arc::new(MemoryEventSink::new()),
        Arc::new(MemoryDecisionCache::new(Duration::from_secs(60))),
    );

    (db, service)
}

fn grant_input(source: Uuid, target: Uuid) -> CreateCrossTenantAccess {
    CreateCrossTenantAccess {
        source_tenant_id: source,
        target_tenant_id: target,
        resource_type: "DATASET".into(),
        resource_id: None,
        permissions: vec!["READ".into(), "EXPORT".into()],
        conditions: None,
        granted_by: "admin".into(),
        expires_at: None,
    }
}

#[tokio::test]
async fn grant_and_check() {
    let (_db, service) = setup().await;
    let source = Uuid::new_v4();
    let target = Uuid::new_v4();

    service.grant(grant_input(source, target)).await.unwrap();

    assert!(service.check(source, target, "DATASET", "READ").await.unwrap());
    assert!(!service.check(source, target, "DATASET", "DELETE").await.unwrap());
    assert!(!service.check(source, target, "REPORT", "READ").await.unwrap());
    // Direction matters.
    assert!(!service.check(target, source, "DATASET", "READ").await.unwrap());
}

#[tokio::test]
async fn same_tenant_and_empty_permissions_are_rejected() {
    let (_db, service) = setup().await;
    let tenant = Uuid::new_v4();

    let err = service
        .grant(grant_input(tenant, tenant))
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::Validation { .. }));

    let mut input = grant_input(Uuid::new_v4(), Uuid::new_v4());
    input.permissions.clear();
    let err = service.grant(input).await.unwrap_err();
    assert!(matches!(err, VerdictError::Validation { .. }));
}

#[tokio::test]
async fn one_active_grant_per_triple() {
    let (_db, service) = setup().await;
    let source = Uuid::new_v4();
    let target = Uuid::new_v4();

    service.grant(grant_input(source, target)).await.unwrap();
    let err = service.grant(grant_input(source, target)).await.unwrap_err();
    assert!(matches!(err, VerdictError::Duplicate { .. }));
}

#[tokio::test]
async fn revoke_then_grant_again_recovers() {
    let (_db, service) = setup().await;
    let source = Uuid::new_v4();
    let target = Uuid::new_v4();

    let grant = service.grant(grant_input(source, target)).await.unwrap();
    service.revoke(grant.id, "admin").await.unwrap();

    assert!(!service.check(source, target, "DATASET", "READ").await.unwrap());

    // The triple is free again after revocation.
    service.grant(grant_input(source, target)).await.unwrap();
    assert!(service.check(source, target, "DATASET", "READ").await.unwrap());
}

#[tokio::test]
async fn listing_covers_both_directions() {
    let (_db, service) = setup().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();

    service.grant(grant_input(a, b)).await.unwrap();
    service.grant(grant_input(c, a)).await.unwrap();

    let grants = service.list_for_tenant(a).await.unwrap();
    assert_eq!(grants.len(), 2);
}

#[tokio::test]
async fn maintenance_sweep_deactivates_expired_state() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    verdict_db::run_migrations(&db).await.unwrap();

    let policies = SurrealPolicyRepository::new(db.clone());
    let role_permissions = SurrealRolePermissionRepository::new(db.clone());
    let user_roles = SurrealUserRoleRepository::new(db.clone());
    let cross_tenant = SurrealCrossTenantAccessRepository::new(db.clone());

    let past = Utc::now() - chrono::Duration::hours(1);
    let tenant_id = Uuid::new_v4();

    // Expired policy.
    policies
        .create(CreatePolicy {
            tenant_id: Some(tenant_id),
            name: "expired".into(),
            description: String::new(),
            policy_type: PolicyType::Conditional,
            effect: PolicyEffect::Deny,
            conditions: None,
            priority: 100,
            start_date: None,
            end_date: Some(past),
            permission_ids: Vec::new(),
            created_by: "admin".into(),
        })
        .await
        .unwrap();

    // Expired role-permission grant.
    let role = SurrealRoleRepository::new(db.clone())
        .create(CreateRole {
            tenant_id: Some(tenant_id),
            name: "SWEPT".into(),
            description: String::new(),
            priority: 100,
            max_users: None,
            is_system: false,
            parent_role_id: None,
            created_by: "admin".into(),
        })
        .await
        .unwrap();
    let permission = SurrealPermissionRepository::new(db.clone())
        .create(CreatePermission {
            resource_type: "REPORT".into(),
            action: "READ".into(),
            description: String::new(),
            risk_level: RiskLevel::Low,
            requires_mfa: false,
            requires_approval: false,
            is_system: false,
        })
        .await
        .unwrap();
    role_permissions
        .create(CreateRolePermission {
            role_id: role.id,
            permission_id: permission.id,
            constraints: None,
            granted_by: "admin".into(),
            expires_at: Some(past),
        })
        .await
        .unwrap();

    // Expired user-role assignment.
    user_roles
        .create(CreateUserRole {
            user_id: Uuid::new_v4(),
            role_id: role.id,
            tenant_id,
            assigned_by: "admin".into(),
            expires_at: Some(past),
        })
        .await
        .unwrap();

    // Expired cross-tenant grant.
    cross_tenant
        .create(CreateCrossTenantAccess {
            source_tenant_id: Uuid::new_v4(),
            target_tenant_id: Uuid::new_v4(),
            resource_type: "DATASET".into(),
            resource_id: None,
            permissions: vec!["READ".into()],
            conditions: None,
            granted_by: "admin".into(),
            expires_at: Some(past),
        })
        .await
        .unwrap();

    let service = MaintenanceService::new(
        policies,
        role_permissions,
        user_roles,
        cross_tenant,
        Arc::new(MemoryDecisionCache::new(Duration::from_secs(60))),
    );

    let report = service.sweep().await.unwrap();
    assert_eq!(report.expired_policies, 1);
    assert_eq!(report.expired_role_permissions, 1);
    assert_eq!(report.expired_user_roles, 1);
    assert_eq!(report.expired_cross_tenant_grants, 1);

    // A second sweep finds nothing left to do.
    let report = service.sweep().await.unwrap();
    assert_eq!(report.expired_policies, 0);
    assert_eq!(report.expired_role_permissions, 0);
    assert_eq!(report.expired_user_roles, 0);
    assert_eq!(report.expired_cross_tenant_grants, 0);
}
