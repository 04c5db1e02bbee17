//! Integration tests for the authorization decision engine.
//!
//! Each test runs against an in-memory SurrealDB with the real schema and
//! repositories, seeding exactly the roles, permissions, resources, and
//! policies the scenario needs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use verdict_core::models::permission::{CreatePermission, RiskLevel};
use verdict_core::models::policy::{CreatePolicy, PolicyEffect, PolicyType};
use verdict_core::models::resource::CreateResource;
use verdict_core::models::role::CreateRole;
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
use verdict_engine::cache::MemoryDecisionCache;
use verdict_engine::{AuthorizationEngine, AuthzRequest, DecisionCache};
use verdict_events::{AuthzEvent, MemoryEventSink};

type Engine = AuthorizationEngine<
    SurrealUserRoleRepository<Db>,
    SurrealRoleRepository<Db>,
    SurrealRolePermissionRepository<Db>,
    SurrealResourceRepository<Db>,
    SurrealPolicyRepository<Db>,
>;

struct TestEnv {
    db: Surreal<Db>,
    engine: Engine,
    cache: Arc<MemoryDecisionCache>,
    sink: Arc<MemoryEventSink>,
    tenant_id: Uuid,
    user_id: Uuid,
}

async fn setup() -> TestEnv {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    verdict_db::run_migrations(&db).await.unwrap();

    let cache = Arc::new(MemoryDecisionCache::new(Duration::from_secs(60)));
    let sink = Arc::new(MemoryEventSink::new());

    let engine = AuthorizationEngine::new(
        SurrealUserRoleRepository::new(db.clone()),
        SurrealRoleRepository::new(db.clone()),
        SurrealRolePermissionRepository::new(db.clone()),
        SurrealResourceRepository::new(db.clone()),
        SurrealPolicyRepository::new(db.clone()),
        cache.clone(),
        sink.clone(),
    );

    TestEnv {
        db,
        engine,
        cache,
        sink,
        tenant_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
    }
}

impl TestEnv {
    async fn create_permission(&self, resource_type: &str, action: &str) -> Uuid {
        let repo = SurrealPermissionRepository::new(self.db.clone());
        repo.create(CreatePermission {
            resource_type: resource_type.into(),
            action: action.into(),
            description: format!("{resource_type} {action}"),
            risk_level: RiskLevel::Low,
            requires_mfa: false,
            requires_approval: false,
            is_system: false,
        })
        .await
        .unwrap()
        .id
    }

    async fn create_role(&self, name: &str, parent: Option<Uuid>) -> Uuid {
        let repo = SurrealRoleRepository::new(self.db.clone());
        repo.create(CreateRole {
            tenant_id: Some(self.tenant_id),
            name: name.into(),
            description: format!("{name} role"),
            priority: 100,
            max_users: None,
            is_system: false,
            parent_role_id: parent,
            created_by: "test".into(),
        })
        .await
        .unwrap()
        .id
    }

    async fn grant(&self, role_id: Uuid, permission_id: Uuid) {
        let repo = SurrealRolePermissionRepository::new(self.db.clone());
        repo.create(CreateRolePermission {
            role_id,
            permission_id,
            constraints: None,
            granted_by: "test".into(),
            expires_at: None,
        })
        .await
        .unwrap();
    }

    async fn assign(&self, user_id: Uuid, role_id: Uuid) -> Uuid {
        let repo = SurrealUserRoleRepository::new(self.db.clone());
        repo.create(CreateUserRole {
            user_id,
            role_id,
            tenant_id: self.tenant_id,
            assigned_by: "test".into(),
            expires_at: None,
        })
        .await
        .unwrap()
        .id
    }

    async fn create_policy(
        &self,
        name: &str,
        policy_type: PolicyType,
        effect: PolicyEffect,
        priority: i32,
        conditions: serde_json::Value,
        permission_ids: Vec<Uuid>,
    ) -> Uuid {
        let repo = SurrealPolicyRepository::new(self.db.clone());
        repo.create(CreatePolicy {
            tenant_id: Some(self.tenant_id),
            name: name.into(),
            description: String::new(),
            policy_type,
            effect,
            conditions: Some(conditions),
            priority,
            start_date: None,
            end_date: None,
            permission_ids,
            created_by: "test".into(),
        })
        .await
        .unwrap()
        .id
    }
}

// ---------------------------------------------------------------------------
// Layer 1-5: roles, permission set, wildcards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_active_roles_denies() {
    let env = setup().await;
    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "READ");

    let response = env.engine.authorize(&request).await;

    assert!(!response.allowed);
    assert_eq!(response.reason, "User has no active roles");
}

#[tokio::test]
async fn direct_permission_match() {
    let env = setup().await;
    let read = env.create_permission("REPORT", "READ").await;
    let view = env.create_permission("REPORT", "VIEW").await;
    let role = env.create_role("DATA_ANALYST", None).await;
    env.grant(role, read).await;
    env.grant(role, view).await;
    env.assign(env.user_id, role).await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "READ");
    let response = env.engine.authorize(&request).await;

    assert!(response.allowed);
    assert_eq!(response.reason, "Direct permission granted");
    assert_eq!(
        response.granted_permissions,
        vec!["REPORT:READ".to_string(), "REPORT:VIEW".to_string()]
    );
}

#[tokio::test]
async fn super_admin_shortcut() {
    let env = setup().await;
    let role = env.create_role("SUPER_ADMIN", None).await;
    env.assign(env.user_id, role).await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "ANYTHING", "DELETE");
    let response = env.engine.authorize(&request).await;

    assert!(response.allowed);
    assert_eq!(response.reason, "Super admin access granted");
    assert_eq!(response.granted_permissions, vec!["SUPER_ADMIN".to_string()]);
}

#[tokio::test]
async fn manage_wildcard_covers_every_action() {
    let env = setup().await;
    let manage = env.create_permission("RESOURCE_X", "MANAGE").await;
    let role = env.create_role("MANAGER", None).await;
    env.grant(role, manage).await;
    env.assign(env.user_id, role).await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "RESOURCE_X", "FROBNICATE");
    let response = env.engine.authorize(&request).await;

    assert!(response.allowed);
    assert_eq!(response.reason, "Wildcard permission granted");
}

#[tokio::test]
async fn star_resource_grants_action_everywhere() {
    let env = setup().await;
    let star_read = env.create_permission("*", "READ").await;
    let role = env.create_role("GLOBAL_READER", None).await;
    env.grant(role, star_read).await;
    env.assign(env.user_id, role).await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "READ");
    let response = env.engine.authorize(&request).await;

    assert!(response.allowed);
    assert_eq!(response.reason, "Wildcard permission granted");

    // The wildcard covers READ, not other actions.
    let request = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "DELETE");
    let response = env.engine.authorize(&request).await;
    assert!(!response.allowed);
}

// ---------------------------------------------------------------------------
// Layer 6: resource scope
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resource_owner_overrides_deny_policy() {
    let env = setup().await;

    // The user needs at least one active role to get past layer 1.
    let unrelated = env.create_permission("WORKSPACE", "READ").await;
    let role = env.create_role("MEMBER", None).await;
    env.grant(role, unrelated).await;
    env.assign(env.user_id, role).await;

    let resources = SurrealResourceRepository::new(env.db.clone());
    let resource = resources
        .create(CreateResource {
            tenant_id: env.tenant_id,
            resource_identifier: "ds-42".into(),
            resource_type: "DATASET".into(),
            name: "Dataset 42".into(),
            parent_resource_id: None,
            attributes: None,
            owner_id: Some(env.user_id),
            is_public: false,
        })
        .await
        .unwrap();

    // A DENY policy attached to the resource that would otherwise apply.
    let read = env.create_permission("DATASET", "READ").await;
    let policy = env
        .create_policy(
            "deny-readers",
            PolicyType::ResourceBased,
            PolicyEffect::Deny,
            100,
            json!({}),
            vec![read],
        )
        .await;
    resources.attach_policy(resource.id, policy).await.unwrap();

    let mut request = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "READ");
    request.resource_id = Some("ds-42".into());
    let response = env.engine.authorize(&request).await;

    assert!(response.allowed);
    assert_eq!(response.reason, "Resource owner access granted");
    assert_eq!(response.granted_permissions, vec!["OWNER".to_string()]);
}

#[tokio::test]
async fn public_resource_read_only() {
    let env = setup().await;

    let unrelated = env.create_permission("WORKSPACE", "READ").await;
    let role = env.create_role("MEMBER", None).await;
    env.grant(role, unrelated).await;
    env.assign(env.user_id, role).await;

    let resources = SurrealResourceRepository::new(env.db.clone());
    resources
        .create(CreateResource {
            tenant_id: env.tenant_id,
            resource_identifier: "pub-1".into(),
            resource_type: "DATASET".into(),
            name: "Public dataset".into(),
            parent_resource_id: None,
            attributes: None,
            owner_id: None,
            is_public: true,
        })
        .await
        .unwrap();

    let mut read = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "READ");
    read.resource_id = Some("pub-1".into());
    let response = env.engine.authorize(&read).await;
    assert!(response.allowed);
    assert_eq!(response.reason, "Public resource access granted");
    assert_eq!(
        response.granted_permissions,
        vec!["PUBLIC_ACCESS".to_string()]
    );

    // DELETE is not a read action; it falls through and is denied.
    let mut delete = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "DELETE");
    delete.resource_id = Some("pub-1".into());
    let response = env.engine.authorize(&delete).await;
    assert!(!response.allowed);
    assert_eq!(response.reason, "No permission for DATASET:DELETE");
}

#[tokio::test]
async fn resource_policy_allow() {
    let env = setup().await;

    let read = env.create_permission("DATASET", "READ").await;
    let role = env.create_role("READER", None).await;
    env.grant(role, read).await;
    env.assign(env.user_id, role).await;

    let resources = SurrealResourceRepository::new(env.db.clone());
    let resource = resources
        .create(CreateResource {
            tenant_id: env.tenant_id,
            resource_identifier: "ds-7".into(),
            resource_type: "DATASET".into(),
            name: "Dataset 7".into(),
            parent_resource_id: None,
            attributes: None,
            owner_id: None,
            is_public: false,
        })
        .await
        .unwrap();

    // User requests an action they hold no direct permission for; the
    // resource policy references the permission they DO hold and allows.
    let policy = env
        .create_policy(
            "readers-may-export",
            PolicyType::ResourceBased,
            PolicyEffect::Allow,
            100,
            json!({}),
            vec![read],
        )
        .await;
    resources.attach_policy(resource.id, policy).await.unwrap();

    let mut request = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "EXPORT");
    request.resource_id = Some("ds-7".into());
    let response = env.engine.authorize(&request).await;

    assert!(response.allowed);
    assert_eq!(response.reason, "Resource policy allows access");
}

// ---------------------------------------------------------------------------
// Layer 7: tenant policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tenant_policy_deny_wins_over_allow() {
    let env = setup().await;

    let unrelated = env.create_permission("WORKSPACE", "READ").await;
    let role = env.create_role("MEMBER", None).await;
    env.grant(role, unrelated).await;
    env.assign(env.user_id, role).await;

    // The DENY policy evaluates first (higher priority) and is decisive.
    env.create_policy(
        "allow-everyone",
        PolicyType::Conditional,
        PolicyEffect::Allow,
        100,
        json!({"expression": "true"}),
        vec![],
    )
    .await;
    env.create_policy(
        "deny-exports",
        PolicyType::Conditional,
        PolicyEffect::Deny,
        200,
        json!({"expression": "action == 'EXPORT'"}),
        vec![],
    )
    .await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "EXPORT");
    let response = env.engine.authorize(&request).await;
    assert!(!response.allowed);
    assert_eq!(response.reason, "Tenant policy denies access");

    // A non-export action sees only the ALLOW policy.
    let request = AuthzRequest::new(env.user_id, env.tenant_id, "DATASET", "READ");
    let response = env.engine.authorize(&request).await;
    assert!(response.allowed);
    assert_eq!(response.reason, "Tenant policy allows access");
}

// ---------------------------------------------------------------------------
// Layer 8: hierarchy inheritance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inherited_permission_through_parent_chain() {
    let env = setup().await;

    let export = env.create_permission("REPORT", "EXPORT").await;
    let read = env.create_permission("REPORT", "READ").await;

    let analyst = env.create_role("ANALYST", None).await;
    env.grant(analyst, export).await;

    let viewer = env.create_role("VIEWER", Some(analyst)).await;
    env.grant(viewer, read).await;

    env.assign(env.user_id, viewer).await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "EXPORT");
    let response = env.engine.authorize(&request).await;

    assert!(response.allowed);
    assert_eq!(response.reason, "Inherited permission granted");
}

#[tokio::test]
async fn inactive_ancestor_stops_the_walk() {
    let env = setup().await;

    let export = env.create_permission("REPORT", "EXPORT").await;
    let analyst = env.create_role("ANALYST", None).await;
    env.grant(analyst, export).await;

    let viewer = env.create_role("VIEWER", Some(analyst)).await;
    let read = env.create_permission("REPORT", "READ").await;
    env.grant(viewer, read).await;
    env.assign(env.user_id, viewer).await;

    // Deactivate the parent; its permissions must no longer be inherited.
    let roles = SurrealRoleRepository::new(env.db.clone());
    roles.set_active(analyst, false).await.unwrap();

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "EXPORT");
    let response = env.engine.authorize(&request).await;

    assert!(!response.allowed);
}

// ---------------------------------------------------------------------------
// Caching, revocation, and the audit trail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revocation_takes_effect_after_invalidation() {
    let env = setup().await;

    let read = env.create_permission("REPORT", "READ").await;
    let role = env.create_role("READER", None).await;
    env.grant(role, read).await;
    let assignment = env.assign(env.user_id, role).await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "READ");
    assert!(env.engine.authorize(&request).await.allowed);

    // Revoke the user's only role and invalidate, as the user-role
    // service does.
    let user_roles = SurrealUserRoleRepository::new(env.db.clone());
    user_roles.set_active(assignment, false).await.unwrap();
    env.cache.invalidate_user(env.user_id, env.tenant_id).await;

    let response = env.engine.authorize(&request).await;
    assert!(!response.allowed);
    assert_eq!(response.reason, "User has no active roles");
}

#[tokio::test]
async fn identical_requests_hit_the_cache() {
    let env = setup().await;

    let read = env.create_permission("REPORT", "READ").await;
    let role = env.create_role("READER", None).await;
    env.grant(role, read).await;
    env.assign(env.user_id, role).await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "READ");
    let first = env.engine.authorize(&request).await;
    let second = env.engine.authorize(&request).await;

    assert_eq!(first.allowed, second.allowed);
    assert_eq!(first.reason, second.reason);
    assert_eq!(first.granted_permissions, second.granted_permissions);

    // The second decision came from the cache: only one audit event.
    let checks = env.sink.count_matching(|e| {
        matches!(e, AuthzEvent::AuthorizationChecked { .. })
    });
    assert_eq!(checks, 1);
}

#[tokio::test]
async fn every_fresh_decision_is_audited() {
    let env = setup().await;

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "READ");
    let response = env.engine.authorize(&request).await;
    assert!(!response.allowed);

    let events = env.sink.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        AuthzEvent::AuthorizationChecked {
            user_id,
            allowed,
            reason,
            ..
        } => {
            assert_eq!(*user_id, env.user_id);
            assert!(!allowed);
            assert_eq!(reason, "User has no active roles");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn expired_assignment_is_ignored() {
    let env = setup().await;

    let read = env.create_permission("REPORT", "READ").await;
    let role = env.create_role("READER", None).await;
    env.grant(role, read).await;

    // Assignment that expired an hour ago.
    let user_roles = SurrealUserRoleRepository::new(env.db.clone());
    user_roles
        .create(CreateUserRole {
            user_id: env.user_id,
            role_id: role,
            tenant_id: env.tenant_id,
            assigned_by: "test".into(),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        })
        .await
        .unwrap();

    let request = AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "READ");
    let response = env.engine.authorize(&request).await;

    assert!(!response.allowed);
    assert_eq!(response.reason, "User has no active roles");
}

#[tokio::test]
async fn batch_authorize_is_per_request() {
    let env = setup().await;

    let read = env.create_permission("REPORT", "READ").await;
    let role = env.create_role("READER", None).await;
    env.grant(role, read).await;
    env.assign(env.user_id, role).await;

    let requests = vec![
        AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "READ"),
        AuthzRequest::new(env.user_id, env.tenant_id, "REPORT", "DELETE"),
    ];
    let results = env.engine.batch_authorize(&requests).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].1.allowed);
    assert!(!results[1].1.allowed);
}
