//! Integration tests for the role service invariants.

use std::sync::Arc;
use std::time::Duration;

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use verdict_admin::role_service::{CreateRoleInput, UpdateRoleInput};
use verdict_admin::user_role_service::AssignRoleInput;
use verdict_admin::{RoleLimits, RoleService, UserRoleService};
use verdict_core::error::VerdictError;
use verdict_core::models::permission::{CreatePermission, RiskLevel};
use verdict_core::models::role::CreateRole;
use verdict_core::repository::{PermissionRepository, RolePermissionRepository, RoleRepository};
use verdict_db::{
    SurrealPermissionRepository, SurrealRolePermissionRepository, SurrealRoleRepository,
    SurrealUserRoleRepository,
};
use verdict_engine::MemoryDecisionCache;
use verdict_events::MemoryEventSink;

type Roles = RoleService<
    SurrealRoleRepository<Db>,
    SurrealPermissionRepository<Db>,
    SurrealRolePermissionRepository<Db>,
    SurrealUserRoleRepository<Db>,
>;

type UserRoles = UserRoleService<SurrealUserRoleRepository<Db>, SurrealRoleRepository<Db>>;

struct TestEnv {
    db: Surreal<Db>,
    roles: Roles,
    user_roles: UserRoles,
    tenant_id: Uuid,
}

async fn setup_with_limits(limits: RoleLimits) -> TestEnv {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    verdict_db::run_migrations(&db).await.unwrap();

    let sink: Arc<MemoryEventSink> = Arc::new(MemoryEventSink::new());
    let cache = Arc::new(MemoryDecisionCache::new(Duration::from_secs(60)));

    let roles = RoleService::new(
        SurrealRoleRepository::new(db.clone()),
        SurrealPermissionRepository::new(db.clone()),
        SurrealRolePermissionRepository::new(db.clone()),
        SurrealUserRoleRepository::new(db.clone()),
        sink.clone(),
        cache.clone(),
        limits,
    );

    let user_roles = UserRoleService::new(
        SurrealUserRoleRepository::new(db.clone()),
        SurrealRoleRepository::new(db.clone()),
        sink,
        cache,
    );

    TestEnv {
        db,
        roles,
        user_roles,
        tenant_id: Uuid::new_v4(),
    }
}

async fn setup() -> TestEnv {
    setup_with_limits(RoleLimits::default()).await
}

impl TestEnv {
    fn create_input(&self, name: &str) -> CreateRoleInput {
        CreateRoleInput {
            tenant_id: Some(self.tenant_id),
            name: name.into(),
            description: format!("{name} role"),
            priority: Some(500),
            max_users: None,
            parent_role_id: None,
            permission_ids: Vec::new(),
            created_by: "admin".into(),
        }
    }

    async fn create_permission(&self, resource_type: &str, action: &str) -> Uuid {
        SurrealPermissionRepository::new(self.db.clone())
            .create(CreatePermission {
                resource_type: resource_type.into(),
                action: action.into(),
                description: String::new(),
                risk_level: RiskLevel::Low,
                requires_mfa: false,
                requires_approval: false,
                is_system: false,
            })
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn duplicate_name_in_tenant_is_rejected() {
    let env = setup().await;

    env.roles.create(env.create_input("ANALYST")).await.unwrap();
    let err = env
        .roles
        .create(env.create_input("ANALYST"))
        .await
        .unwrap_err();

    assert!(matches!(err, VerdictError::Duplicate { .. }));
}

#[tokio::test]
async fn priority_bounds_are_validated() {
    let env = setup().await;

    let mut input = env.create_input("BAD");
    input.priority = Some(0);
    assert!(matches!(
        env.roles.create(input).await.unwrap_err(),
        VerdictError::Validation { .. }
    ));

    let mut input = env.create_input("BAD");
    input.priority = Some(10_001);
    assert!(matches!(
        env.roles.create(input).await.unwrap_err(),
        VerdictError::Validation { .. }
    ));
}

#[tokio::test]
async fn system_roles_cannot_be_updated_without_override() {
    let env = setup().await;

    // Created directly through the repository, as tenant sync does.
    let system_role = SurrealRoleRepository::new(env.db.clone())
        .create(CreateRole {
            tenant_id: Some(env.tenant_id),
            name: "TENANT_ADMIN".into(),
            description: "system".into(),
            priority: 1000,
            max_users: None,
            is_system: true,
            parent_role_id: None,
            created_by: "SYSTEM".into(),
        })
        .await
        .unwrap();

    let err = env
        .roles
        .update(
            system_role.id,
            UpdateRoleInput {
                description: Some("tampered".into()),
                updated_by: "admin".into(),
                expected_version: system_role.version,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::BusinessRule { .. }));

    // The explicit override flag allows the update.
    let updated = env
        .roles
        .update(
            system_role.id,
            UpdateRoleInput {
                description: Some("maintained".into()),
                allow_system_update: true,
                updated_by: "admin".into(),
                expected_version: system_role.version,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.description, "maintained");
}

#[tokio::test]
async fn stale_version_conflicts() {
    let env = setup().await;

    let role = env.roles.create(env.create_input("EDITOR")).await.unwrap();

    env.roles
        .update(
            role.id,
            UpdateRoleInput {
                description: Some("first".into()),
                updated_by: "a".into(),
                expected_version: role.version,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Second writer still holds the old version.
    let err = env
        .roles
        .update(
            role.id,
            UpdateRoleInput {
                description: Some("second".into()),
                updated_by: "b".into(),
                expected_version: role.version,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::Conflict { .. }));
}

#[tokio::test]
async fn assigning_same_permissions_twice_is_a_no_op() {
    let env = setup().await;

    let role = env.roles.create(env.create_input("READER")).await.unwrap();
    let read = env.create_permission("REPORT", "READ").await;
    let view = env.create_permission("REPORT", "VIEW").await;

    env.roles
        .assign_permissions(role.id, &[read, view], "admin")
        .await
        .unwrap();
    env.roles
        .assign_permissions(role.id, &[read, view], "admin")
        .await
        .unwrap();

    let count = SurrealRolePermissionRepository::new(env.db.clone())
        .count_by_role(role.id)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn permission_cap_is_enforced() {
    let env = setup_with_limits(RoleLimits {
        max_hierarchy_depth: 10,
        max_permissions_per_role: 2,
    })
    .await;

    let role = env.roles.create(env.create_input("CAPPED")).await.unwrap();
    let a = env.create_permission("X", "READ").await;
    let b = env.create_permission("X", "VIEW").await;
    let c = env.create_permission("X", "UPDATE").await;

    env.roles
        .assign_permissions(role.id, &[a, b], "admin")
        .await
        .unwrap();

    let err = env
        .roles
        .assign_permissions(role.id, &[c], "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::BusinessRule { .. }));
}

#[tokio::test]
async fn hierarchy_depth_is_bounded() {
    let env = setup_with_limits(RoleLimits {
        max_hierarchy_depth: 3,
        max_permissions_per_role: 100,
    })
    .await;

    let root = env.roles.create(env.create_input("L0")).await.unwrap();

    let mut input = env.create_input("L1");
    input.parent_role_id = Some(root.id);
    let l1 = env.roles.create(input).await.unwrap();

    let mut input = env.create_input("L2");
    input.parent_role_id = Some(l1.id);
    let l2 = env.roles.create(input).await.unwrap();

    // A fourth level exceeds the bound of 3.
    let mut input = env.create_input("L3");
    input.parent_role_id = Some(l2.id);
    let err = env.roles.create(input).await.unwrap_err();
    assert!(matches!(err, VerdictError::BusinessRule { .. }));
}

#[tokio::test]
async fn parent_must_share_the_tenant() {
    let env = setup().await;

    let other_tenant_parent = SurrealRoleRepository::new(env.db.clone())
        .create(CreateRole {
            tenant_id: Some(Uuid::new_v4()),
            name: "FOREIGN".into(),
            description: String::new(),
            priority: 100,
            max_users: None,
            is_system: false,
            parent_role_id: None,
            created_by: "admin".into(),
        })
        .await
        .unwrap();

    let mut input = env.create_input("CHILD");
    input.parent_role_id = Some(other_tenant_parent.id);
    let err = env.roles.create(input).await.unwrap_err();
    assert!(matches!(err, VerdictError::Validation { .. }));
}

#[tokio::test]
async fn delete_is_refused_while_in_use() {
    let env = setup().await;

    let role = env.roles.create(env.create_input("IN_USE")).await.unwrap();
    env.user_roles
        .assign(AssignRoleInput {
            user_id: Uuid::new_v4(),
            role_id: role.id,
            tenant_id: env.tenant_id,
            assigned_by: "admin".into(),
            expires_at: None,
        })
        .await
        .unwrap();

    let err = env.roles.delete(role.id, "admin").await.unwrap_err();
    assert!(matches!(err, VerdictError::BusinessRule { .. }));
}

#[tokio::test]
async fn delete_is_refused_with_children() {
    let env = setup().await;

    let parent = env.roles.create(env.create_input("PARENT")).await.unwrap();
    let mut input = env.create_input("CHILD");
    input.parent_role_id = Some(parent.id);
    env.roles.create(input).await.unwrap();

    let err = env.roles.delete(parent.id, "admin").await.unwrap_err();
    assert!(matches!(err, VerdictError::BusinessRule { .. }));
}

#[tokio::test]
async fn max_users_cannot_drop_below_current() {
    let env = setup().await;

    let mut input = env.create_input("LIMITED");
    input.max_users = Some(5);
    let role = env.roles.create(input).await.unwrap();

    for _ in 0..2 {
        env.user_roles
            .assign(AssignRoleInput {
                user_id: Uuid::new_v4(),
                role_id: role.id,
                tenant_id: env.tenant_id,
                assigned_by: "admin".into(),
                expires_at: None,
            })
            .await
            .unwrap();
    }

    let err = env
        .roles
        .update(
            role.id,
            UpdateRoleInput {
                max_users: Some(1),
                updated_by: "admin".into(),
                expected_version: role.version,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::BusinessRule { .. }));
}

#[tokio::test]
async fn max_users_caps_assignments() {
    let env = setup().await;

    let mut input = env.create_input("TINY");
    input.max_users = Some(1);
    let role = env.roles.create(input).await.unwrap();

    env.user_roles
        .assign(AssignRoleInput {
            user_id: Uuid::new_v4(),
            role_id: role.id,
            tenant_id: env.tenant_id,
            assigned_by: "admin".into(),
            expires_at: None,
        })
        .await
        .unwrap();

    let err = env
        .user_roles
        .assign(AssignRoleInput {
            user_id: Uuid::new_v4(),
            role_id: role.id,
            tenant_id: env.tenant_id,
            assigned_by: "admin".into(),
            expires_at: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::BusinessRule { .. }));
}

#[tokio::test]
async fn duplicate_assignment_is_rejected_and_revoke_restores() {
    let env = setup().await;

    let role = env.roles.create(env.create_input("MEMBER")).await.unwrap();
    let user_id = Uuid::new_v4();

    let assign = AssignRoleInput {
        user_id,
        role_id: role.id,
        tenant_id: env.tenant_id,
        assigned_by: "admin".into(),
        expires_at: None,
    };

    env.user_roles.assign(assign.clone()).await.unwrap();
    assert!(matches!(
        env.user_roles.assign(assign.clone()).await.unwrap_err(),
        VerdictError::Duplicate { .. }
    ));

    // Revoke-then-assign is a single-step recovery.
    env.user_roles
        .revoke(user_id, role.id, env.tenant_id, "admin")
        .await
        .unwrap();
    assert!(!env
        .user_roles
        .user_has_role(user_id, role.id, env.tenant_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn clone_copies_permissions_and_is_never_system() {
    let env = setup().await;

    let role = env.roles.create(env.create_input("SOURCE")).await.unwrap();
    let read = env.create_permission("REPORT", "READ").await;
    env.roles
        .assign_permissions(role.id, &[read], "admin")
        .await
        .unwrap();

    let cloned = env
        .roles
        .clone_role(role.id, "COPY", Some(env.tenant_id), "admin")
        .await
        .unwrap();

    assert!(!cloned.is_system);
    let count = SurrealRolePermissionRepository::new(env.db.clone())
        .count_by_role(cloned.id)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn inherited_permissions_walk_the_chain() {
    let env = setup().await;

    let parent = env.roles.create(env.create_input("PARENT")).await.unwrap();
    let export = env.create_permission("REPORT", "EXPORT").await;
    env.roles
        .assign_permissions(parent.id, &[export], "admin")
        .await
        .unwrap();

    let mut input = env.create_input("CHILD");
    input.parent_role_id = Some(parent.id);
    let child = env.roles.create(input).await.unwrap();
    let read = env.create_permission("REPORT", "READ").await;
    env.roles
        .assign_permissions(child.id, &[read], "admin")
        .await
        .unwrap();

    let all = env
        .roles
        .permissions_including_inherited(child.id)
        .await
        .unwrap();
    let mut names: Vec<String> = all.iter().map(|p| p.qualified_name()).collect();
    names.sort();
    assert_eq!(names, vec!["REPORT:EXPORT", "REPORT:READ"]);

    let hierarchy = env.roles.hierarchy(child.id).await.unwrap();
    assert_eq!(hierarchy.parent_chain.len(), 1);
    assert_eq!(hierarchy.parent_chain[0].id, parent.id);
    assert_eq!(hierarchy.all_permissions.len(), 2);
}

#[tokio::test]
async fn expiration_must_be_in_the_future() {
    let env = setup().await;

    let role = env.roles.create(env.create_input("EXPIRES")).await.unwrap();
    let read = env.create_permission("REPORT", "READ").await;
    env.roles
        .assign_permissions(role.id, &[read], "admin")
        .await
        .unwrap();

    let err = env
        .roles
        .set_permission_expiration(
            role.id,
            read,
            Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::Validation { .. }));

    env.roles
        .set_permission_expiration(
            role.id,
            read,
            Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        )
        .await
        .unwrap();
}
