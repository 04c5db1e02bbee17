//! Integration tests for the SurrealDB repositories against the
//! in-memory engine.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use verdict_core::error::VerdictError;
use verdict_core::models::permission::{CreatePermission, RiskLevel};
use verdict_core::models::policy::{CreatePolicy, PolicyEffect, PolicyType};
use verdict_core::models::resource::CreateResource;
use verdict_core::models::role::{CreateRole, UpdateRole};
use verdict_core::models::role_permission::CreateRolePermission;
use verdict_core::models::user_role::CreateUserRole;
use verdict_core::repository::{
    PermissionRepository, PolicyRepository, ResourceRepository, RolePermissionRepository,
    RoleRepository, UserRoleRepository,
};
use verdict_db::{
    SurrealPermissionRepository, SurrealPolicyRepository, SurrealResourceRepository,
    SurrealRolePermissionRepository, SurrealRoleRepository, SurrealUserRoleRepository,
};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    verdict_db::run_migrations(&db).await.unwrap();
    db
}

fn role_input(tenant_id: Option<Uuid>, name: &str) -> CreateRole {
    CreateRole {
        tenant_id,
        name: name.into(),
        description: format!("{name} role"),
        priority: 100,
        max_users: None,
        is_system: false,
        parent_role_id: None,
        created_by: "test".into(),
    }
}

fn permission_input(resource_type: &str, action: &str) -> CreatePermission {
    CreatePermission {
        resource_type: resource_type.into(),
        action: action.into(),
        description: String::new(),
        risk_level: RiskLevel::Low,
        requires_mfa: false,
        requires_approval: false,
        is_system: false,
    }
}

#[tokio::test]
async fn role_crud_round_trip() {
    let db = setup().await;
    let repo = SurrealRoleRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let created = repo.create(role_input(Some(tenant_id), "ANALYST")).await.unwrap();
    assert_eq!(created.name, "ANALYST");
    assert_eq!(created.version, 0);
    assert!(created.is_active);

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched.tenant_id, Some(tenant_id));

    let by_name = repo.get_by_name(Some(tenant_id), "ANALYST").await.unwrap();
    assert_eq!(by_name.id, created.id);

    let updated = repo
        .update(
            created.id,
            created.version,
            UpdateRole {
                description: Some("updated".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.description, "updated");
    assert_eq!(updated.version, 1);

    repo.delete(created.id).await.unwrap();
    assert!(matches!(
        repo.get_by_id(created.id).await.unwrap_err(),
        VerdictError::NotFound { .. }
    ));
}

#[tokio::test]
async fn role_name_is_unique_per_tenant() {
    let db = setup().await;
    let repo = SurrealRoleRepository::new(db);
    let tenant_id = Uuid::new_v4();

    repo.create(role_input(Some(tenant_id), "ANALYST")).await.unwrap();

    let err = repo
        .create(role_input(Some(tenant_id), "ANALYST"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::Duplicate { .. }));

    // The same name in another tenant is fine.
    repo.create(role_input(Some(Uuid::new_v4()), "ANALYST"))
        .await
        .unwrap();
}

#[tokio::test]
async fn stale_role_update_conflicts() {
    let db = setup().await;
    let repo = SurrealRoleRepository::new(db);

    let role = repo.create(role_input(Some(Uuid::new_v4()), "EDITOR")).await.unwrap();

    repo.update(
        role.id,
        role.version,
        UpdateRole {
            priority: Some(200),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let err = repo
        .update(
            role.id,
            role.version,
            UpdateRole {
                priority: Some(300),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::Conflict { .. }));
}

#[tokio::test]
async fn permission_pair_is_globally_unique() {
    let db = setup().await;
    let repo = SurrealPermissionRepository::new(db);

    repo.create(permission_input("REPORT", "READ")).await.unwrap();
    let err = repo
        .create(permission_input("REPORT", "READ"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerdictError::Duplicate { .. }));
}

#[tokio::test]
async fn find_or_create_is_idempotent() {
    let db = setup().await;
    let repo = SurrealPermissionRepository::new(db);

    let first = repo
        .find_or_create(permission_input("DATASET", "READ"))
        .await
        .unwrap();
    let second = repo
        .find_or_create(permission_input("DATASET", "READ"))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn distinct_enumerations() {
    let db = setup().await;
    let repo = SurrealPermissionRepository::new(db);

    repo.create(permission_input("REPORT", "READ")).await.unwrap();
    repo.create(permission_input("REPORT", "VIEW")).await.unwrap();
    repo.create(permission_input("DATASET", "READ")).await.unwrap();

    let types = repo.distinct_resource_types().await.unwrap();
    assert_eq!(types, vec!["DATASET".to_string(), "REPORT".to_string()]);

    let actions = repo.distinct_actions().await.unwrap();
    assert_eq!(actions, vec!["READ".to_string(), "VIEW".to_string()]);
}

#[tokio::test]
async fn bindings_join_roles_and_grants() {
    let db = setup().await;
    let roles = SurrealRoleRepository::new(db.clone());
    let permissions = SurrealPermissionRepository::new(db.clone());
    let grants = SurrealRolePermissionRepository::new(db.clone());
    let user_roles = SurrealUserRoleRepository::new(db.clone());

    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let role = roles.create(role_input(Some(tenant_id), "READER")).await.unwrap();
    let read = permissions.create(permission_input("REPORT", "READ")).await.unwrap();
    let expired = permissions.create(permission_input("REPORT", "DELETE")).await.unwrap();

    grants
        .create(CreateRolePermission {
            role_id: role.id,
            permission_id: read.id,
            constraints: None,
            granted_by: "test".into(),
            expires_at: None,
        })
        .await
        .unwrap();
    // An expired grant must not appear in the binding.
    grants
        .create(CreateRolePermission {
            role_id: role.id,
            permission_id: expired.id,
            constraints: None,
            granted_by: "test".into(),
            expires_at: Some(Utc::now() - Duration::hours(1)),
        })
        .await
        .unwrap();

    user_roles
        .create(CreateUserRole {
            user_id,
            role_id: role.id,
            tenant_id,
            assigned_by: "test".into(),
            expires_at: None,
        })
        .await
        .unwrap();

    let bindings = user_roles
        .find_active_bindings(user_id, tenant_id)
        .await
        .unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].role.id, role.id);
    assert_eq!(bindings[0].grants.len(), 1);
    assert_eq!(bindings[0].grants[0].permission.qualified_name(), "REPORT:READ");
}

#[tokio::test]
async fn user_role_triple_is_unique() {
    let db = setup().await;
    let roles = SurrealRoleRepository::new(db.clone());
    let user_roles = SurrealUserRoleRepository::new(db.clone());

    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let role = roles.create(role_input(Some(tenant_id), "MEMBER")).await.unwrap();

    let input = CreateUserRole {
        user_id,
        role_id: role.id,
        tenant_id,
        assigned_by: "test".into(),
        expires_at: None,
    };
    user_roles.create(input.clone()).await.unwrap();
    let err = user_roles.create(input).await.unwrap_err();
    assert!(matches!(err, VerdictError::Duplicate { .. }));
}

#[tokio::test]
async fn tenant_policies_respect_the_date_window() {
    let db = setup().await;
    let policies = SurrealPolicyRepository::new(db.clone());
    let tenant_id = Uuid::new_v4();

    let policy_input = |name: &str, start, end| CreatePolicy {
        tenant_id: Some(tenant_id),
        name: name.into(),
        description: String::new(),
        policy_type: PolicyType::Conditional,
        effect: PolicyEffect::Allow,
        conditions: None,
        priority: 100,
        start_date: start,
        end_date: end,
        permission_ids: Vec::new(),
        created_by: "test".into(),
    };

    policies.create(policy_input("current", None, None)).await.unwrap();
    policies
        .create(policy_input(
            "not-yet",
            Some(Utc::now() + Duration::days(1)),
            None,
        ))
        .await
        .unwrap();
    policies
        .create(policy_input(
            "expired",
            None,
            Some(Utc::now() - Duration::days(1)),
        ))
        .await
        .unwrap();

    let active = policies
        .find_active_for_tenant(tenant_id, Utc::now())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].policy.name, "current");
}

#[tokio::test]
async fn policies_order_by_priority_descending() {
    let db = setup().await;
    let policies = SurrealPolicyRepository::new(db.clone());
    let tenant_id = Uuid::new_v4();

    for (name, priority) in [("low", 10), ("high", 1000), ("mid", 100)] {
        policies
            .create(CreatePolicy {
                tenant_id: Some(tenant_id),
                name: name.into(),
                description: String::new(),
                policy_type: PolicyType::Conditional,
                effect: PolicyEffect::Allow,
                conditions: None,
                priority,
                start_date: None,
                end_date: None,
                permission_ids: Vec::new(),
                created_by: "test".into(),
            })
            .await
            .unwrap();
    }

    let active = policies
        .find_active_for_tenant(tenant_id, Utc::now())
        .await
        .unwrap();
    let names: Vec<&str> = active.iter().map(|b| b.policy.name.as_str()).collect();
    assert_eq!(names, vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn resource_with_attached_policy_bundles() {
    let db = setup().await;
    let resources = SurrealResourceRepository::new(db.clone());
    let policies = SurrealPolicyRepository::new(db.clone());
    let permissions = SurrealPermissionRepository::new(db.clone());

    let tenant_id = Uuid::new_v4();
    let read = permissions.create(permission_input("DATASET", "READ")).await.unwrap();

    let resource = resources
        .create(CreateResource {
            tenant_id,
            resource_identifier: "ds-42".into(),
            resource_type: "DATASET".into(),
            name: "Dataset 42".into(),
            parent_resource_id: None,
            attributes: Some(serde_json::json!({"sensitivity": "high"})),
            owner_id: None,
            is_public: false,
        })
        .await
        .unwrap();

    let policy = policies
        .create(CreatePolicy {
            tenant_id: Some(tenant_id),
            name: "dataset-readers".into(),
            description: String::new(),
            policy_type: PolicyType::ResourceBased,
            effect: PolicyEffect::Allow,
            conditions: None,
            priority: 100,
            start_date: None,
            end_date: None,
            permission_ids: vec![read.id],
            created_by: "test".into(),
        })
        .await
        .unwrap();

    resources.attach_policy(resource.id, policy.id).await.unwrap();

    let loaded = resources
        .get_by_identifier_with_policies("ds-42")
        .await
        .unwrap()
        .expect("resource resolves");
    assert_eq!(loaded.resource.id, resource.id);
    assert_eq!(loaded.policies.len(), 1);
    assert_eq!(loaded.policies[0].policy.id, policy.id);
    assert_eq!(loaded.policies[0].permissions.len(), 1);
    assert_eq!(loaded.policies[0].resources.len(), 1);
    assert_eq!(loaded.policies[0].resources[0].resource_identifier, "ds-42");

    // Unknown identifiers resolve to None, not an error.
    assert!(resources
        .get_by_identifier_with_policies("missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn resource_identifier_is_globally_unique() {
    let db = setup().await;
    let resources = SurrealResourceRepository::new(db.clone());

    let input = |tenant_id| CreateResource {
        tenant_id,
        resource_identifier: "shared-id".into(),
        resource_type: "DATASET".into(),
        name: "Dataset".into(),
        parent_resource_id: None,
        attributes: None,
        owner_id: None,
        is_public: false,
    };

    resources.create(input(Uuid::new_v4())).await.unwrap();
    let err = resources.create(input(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, VerdictError::Duplicate { .. }));
}
