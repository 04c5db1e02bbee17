//! HTTP adapter.
//!
//! Thin dispatchers over the decision engine and the administrative
//! services: handlers parse the request, call exactly one service
//! operation, and map the result. Mutating admin routes enforce coarse
//! RBAC (`<RESOURCE>:MANAGE`) on the caller identified by `X-User-Id`.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use surrealdb::engine::remote::ws::Client;
use uuid::Uuid;
use verdict_admin::role_service::{CreateRoleInput, UpdateRoleInput};
use verdict_admin::user_role_service::AssignRoleInput;
use verdict_admin::{
    CrossTenantAccessService, PermissionService, PolicyService, ResourceService, RoleService,
    UserRoleService,
};
use verdict_core::error::VerdictError;
use verdict_core::models::cross_tenant::CreateCrossTenantAccess;
use verdict_core::models::policy::{CreatePolicy, PolicyEffect, PolicyType};
use verdict_core::models::resource::CreateResource;
use verdict_db::{
    SurrealCrossTenantAccessRepository, SurrealPermissionRepository, SurrealPolicyRepository,
    SurrealResourceRepository, SurrealRolePermissionRepository, SurrealRoleRepository,
    SurrealUserRoleRepository,
};
use verdict_engine::{AuthorizationEngine, AuthzRequest};

type Engine = AuthorizationEngine<
    SurrealUserRoleRepository<Client>,
    SurrealRoleRepository<Client>,
    SurrealRolePermissionRepository<Client>,
    SurrealResourceRepository<Client>,
    SurrealPolicyRepository<Client>,
>;

pub struct AppState {
    pub engine: Engine,
    pub roles: RoleService<
        SurrealRoleRepository<Client>,
        SurrealPermissionRepository<Client>,
        SurrealRolePermissionRepository<Client>,
        SurrealUserRoleRepository<Client>,
    >,
    pub permissions: PermissionService<SurrealPermissionRepository<Client>>,
    pub policies: PolicyService<SurrealPolicyRepository<Client>>,
    pub resources: ResourceService<SurrealResourceRepository<Client>>,
    pub user_roles:
        UserRoleService<SurrealUserRoleRepository<Client>, SurrealRoleRepository<Client>>,
    pub cross_tenant: CrossTenantAccessService<SurrealCrossTenantAccessRepository<Client>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/authz/check", post(authz_check))
        .route("/api/v1/authz/batch", post(authz_batch))
        .route("/api/v1/roles", post(create_role))
        .route(
            "/api/v1/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/api/v1/roles/{id}/permissions", post(assign_permissions))
        .route("/api/v1/roles/{id}/hierarchy", get(role_hierarchy))
        .route("/api/v1/user-roles", post(assign_user_role))
        .route(
            "/api/v1/users/{user_id}/roles/{role_id}",
            axum::routing::delete(revoke_user_role),
        )
        .route("/api/v1/permissions", get(list_permissions))
        .route(
            "/api/v1/permissions/resource-types",
            get(list_resource_types),
        )
        .route("/api/v1/permissions/actions", get(list_actions))
        .route("/api/v1/policies", post(create_policy))
        .route("/api/v1/policies/{id}/evaluate", post(evaluate_policy))
        .route("/api/v1/resources", post(create_resource))
        .route("/api/v1/cross-tenant", post(grant_cross_tenant))
        .route(
            "/api/v1/cross-tenant/{id}/revoke",
            post(revoke_cross_tenant),
        )
        .route("/api/v1/cross-tenant/check", get(check_cross_tenant))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

struct ApiError(VerdictError);

impl From<VerdictError> for ApiError {
    fn from(err: VerdictError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VerdictError::NotFound { .. } => StatusCode::NOT_FOUND,
            VerdictError::Duplicate { .. } | VerdictError::Conflict { .. } => {
                StatusCode::CONFLICT
            }
            VerdictError::Validation { .. } | VerdictError::BusinessRule { .. } => {
                StatusCode::BAD_REQUEST
            }
            VerdictError::TenantIsolation { .. } => StatusCode::FORBIDDEN,
            VerdictError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            VerdictError::Database(_) | VerdictError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, axum::Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Coarse RBAC on admin routes
// ---------------------------------------------------------------------------

/// The caller (from `X-User-Id`) must hold `<resource>:MANAGE` in the
/// tenant being mutated.
async fn require_manage(
    state: &AppState,
    headers: &HeaderMap,
    tenant_id: Uuid,
    resource: &str,
) -> Result<(), ApiError> {
    let caller = headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(VerdictError::Validation {
            message: "Missing or invalid X-User-Id header".into(),
        })?;

    if state
        .engine
        .has_permission(caller, tenant_id, resource, "MANAGE")
        .await
    {
        Ok(())
    } else {
        Err(VerdictError::TenantIsolation {
            message: format!("Caller lacks {resource}:MANAGE"),
        }
        .into())
    }
}

fn client_context(headers: &HeaderMap, request: &mut AuthzRequest) {
    if request.ip_address.is_none() {
        request.ip_address = headers
            .get("X-User-IP")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }
    if request.user_agent.is_none() {
        request.user_agent = headers
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }
}

// ---------------------------------------------------------------------------
// Decision endpoints
// ---------------------------------------------------------------------------

async fn authz_check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(mut request): axum::Json<AuthzRequest>,
) -> impl IntoResponse {
    client_context(&headers, &mut request);
    axum::Json(state.engine.authorize(&request).await)
}

async fn authz_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(mut requests): axum::Json<Vec<AuthzRequest>>,
) -> impl IntoResponse {
    for request in &mut requests {
        client_context(&headers, request);
    }
    let results = state.engine.batch_authorize(&requests).await;
    let body: Vec<_> = results
        .into_iter()
        .map(|(request, response)| json!({ "request": request, "response": response }))
        .collect();
    axum::Json(body)
}

// ---------------------------------------------------------------------------
// Role endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateRoleBody {
    tenant_id: Option<Uuid>,
    name: String,
    #[serde(default)]
    description: String,
    priority: Option<i32>,
    max_users: Option<u32>,
    parent_role_id: Option<Uuid>,
    #[serde(default)]
    permission_ids: Vec<Uuid>,
    created_by: String,
}

async fn create_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateRoleBody>,
) -> ApiResult<impl IntoResponse> {
    if let Some(tenant_id) = body.tenant_id {
        require_manage(&state, &headers, tenant_id, "ROLE").await?;
    }

    let role = state
        .roles
        .create(CreateRoleInput {
            tenant_id: body.tenant_id,
            name: body.name,
            description: body.description,
            priority: body.priority,
            max_users: body.max_users,
            parent_role_id: body.parent_role_id,
            permission_ids: body.permission_ids,
            created_by: body.created_by,
        })
        .await?;

    Ok((StatusCode::CREATED, axum::Json(role)))
}

async fn get_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let usage = state.roles.get(id).await?;
    Ok(axum::Json(json!({
        "role": usage.role,
        "active_users": usage.active_users,
    })))
}

#[derive(Deserialize)]
struct UpdateRoleBody {
    name: Option<String>,
    description: Option<String>,
    priority: Option<i32>,
    max_users: Option<u32>,
    is_active: Option<bool>,
    #[serde(default)]
    allow_system_update: bool,
    updated_by: String,
    expected_version: u64,
}

async fn update_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<UpdateRoleBody>,
) -> ApiResult<impl IntoResponse> {
    let existing = state.roles.get(id).await?;
    if let Some(tenant_id) = existing.role.tenant_id {
        require_manage(&state, &headers, tenant_id, "ROLE").await?;
    }

    let role = state
        .roles
        .update(
            id,
            UpdateRoleInput {
                name: body.name,
                description: body.description,
                priority: body.priority,
                max_users: body.max_users,
                is_active: body.is_active,
                allow_system_update: body.allow_system_update,
                updated_by: body.updated_by,
                expected_version: body.expected_version,
            },
        )
        .await?;

    Ok(axum::Json(role))
}

#[derive(Deserialize)]
struct DeleteRoleQuery {
    deleted_by: String,
}

async fn delete_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteRoleQuery>,
) -> ApiResult<StatusCode> {
    let existing = state.roles.get(id).await?;
    if let Some(tenant_id) = existing.role.tenant_id {
        require_manage(&state, &headers, tenant_id, "ROLE").await?;
    }

    state.roles.delete(id, &query.deleted_by).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AssignPermissionsBody {
    permission_ids: Vec<Uuid>,
    assigned_by: String,
}

async fn assign_permissions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<AssignPermissionsBody>,
) -> ApiResult<StatusCode> {
    let existing = state.roles.get(id).await?;
    if let Some(tenant_id) = existing.role.tenant_id {
        require_manage(&state, &headers, tenant_id, "ROLE").await?;
    }

    state
        .roles
        .assign_permissions(id, &body.permission_ids, &body.assigned_by)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn role_hierarchy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let hierarchy = state.roles.hierarchy(id).await?;
    Ok(axum::Json(json!({
        "role": hierarchy.role,
        "parent_chain": hierarchy.parent_chain,
        "children": hierarchy.children,
        "all_permissions": hierarchy.all_permissions,
    })))
}

// ---------------------------------------------------------------------------
// User-role endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AssignUserRoleBody {
    user_id: Uuid,
    role_id: Uuid,
    tenant_id: Uuid,
    assigned_by: String,
    expires_at: Option<DateTime<Utc>>,
}

async fn assign_user_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<AssignUserRoleBody>,
) -> ApiResult<impl IntoResponse> {
    require_manage(&state, &headers, body.tenant_id, "ROLE").await?;

    let assignment = state
        .user_roles
        .assign(AssignRoleInput {
            user_id: body.user_id,
            role_id: body.role_id,
            tenant_id: body.tenant_id,
            assigned_by: body.assigned_by,
            expires_at: body.expires_at,
        })
        .await?;

    Ok((StatusCode::CREATED, axum::Json(assignment)))
}

#[derive(Deserialize)]
struct RevokeQuery {
    tenant_id: Uuid,
    revoked_by: String,
}

async fn revoke_user_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<RevokeQuery>,
) -> ApiResult<StatusCode> {
    require_manage(&state, &headers, query.tenant_id, "ROLE").await?;

    state
        .user_roles
        .revoke(user_id, role_id, query.tenant_id, &query.revoked_by)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Permission endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ListPermissionsQuery {
    resource_type: Option<String>,
    action: Option<String>,
    is_active: Option<bool>,
    #[serde(default)]
    offset: u64,
    limit: Option<u64>,
}

async fn list_permissions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPermissionsQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .permissions
        .list(
            verdict_core::repository::PermissionFilter {
                resource_type: query.resource_type,
                action: query.action,
                is_active: query.is_active,
            },
            verdict_core::repository::Pagination {
                offset: query.offset,
                limit: query.limit.unwrap_or(50),
            },
        )
        .await?;

    Ok(axum::Json(json!({
        "items": page.items,
        "total": page.total,
        "offset": page.offset,
        "limit": page.limit,
    })))
}

async fn list_resource_types(
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    Ok(axum::Json(state.permissions.resource_types().await?))
}

async fn list_actions(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(axum::Json(state.permissions.actions().await?))
}

// ---------------------------------------------------------------------------
// Policy endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreatePolicyBody {
    tenant_id: Option<Uuid>,
    name: String,
    #[serde(default)]
    description: String,
    policy_type: PolicyType,
    effect: PolicyEffect,
    conditions: Option<serde_json::Value>,
    priority: Option<i32>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    permission_ids: Vec<Uuid>,
    created_by: String,
}

async fn create_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreatePolicyBody>,
) -> ApiResult<impl IntoResponse> {
    if let Some(tenant_id) = body.tenant_id {
        require_manage(&state, &headers, tenant_id, "POLICY").await?;
    }

    let policy = state
        .policies
        .create(CreatePolicy {
            tenant_id: body.tenant_id,
            name: body.name,
            description: body.description,
            policy_type: body.policy_type,
            effect: body.effect,
            conditions: body.conditions,
            priority: body.priority.unwrap_or(100),
            start_date: body.start_date,
            end_date: body.end_date,
            permission_ids: body.permission_ids,
            created_by: body.created_by,
        })
        .await?;

    Ok((StatusCode::CREATED, axum::Json(policy)))
}

#[derive(Deserialize)]
struct EvaluatePolicyBody {
    request: AuthzRequest,
}

async fn evaluate_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<EvaluatePolicyBody>,
) -> ApiResult<impl IntoResponse> {
    // Test-only evaluation runs against an empty permission set; it
    // exercises the policy itself, not a live user.
    let outcome = state.policies.evaluate(id, &body.request, &[]).await?;
    Ok(axum::Json(json!({
        "policy_id": outcome.policy_id,
        "policy_name": outcome.policy_name,
        "effect": outcome.effect.map(|e| format!("{e:?}")),
        "evaluated": outcome.evaluated,
        "reason": outcome.reason,
        "evaluated_at": outcome.evaluated_at,
    })))
}

// ---------------------------------------------------------------------------
// Resource endpoints
// ---------------------------------------------------------------------------

async fn create_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateResource>,
) -> ApiResult<impl IntoResponse> {
    require_manage(&state, &headers, body.tenant_id, "RESOURCE").await?;

    let resource = state.resources.create(body).await?;
    Ok((StatusCode::CREATED, axum::Json(resource)))
}

// ---------------------------------------------------------------------------
// Cross-tenant endpoints
// ---------------------------------------------------------------------------

async fn grant_cross_tenant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateCrossTenantAccess>,
) -> ApiResult<impl IntoResponse> {
    require_manage(&state, &headers, body.source_tenant_id, "TENANT").await?;

    let grant = state.cross_tenant.grant(body).await?;
    Ok((StatusCode::CREATED, axum::Json(grant)))
}

#[derive(Deserialize)]
struct RevokeCrossTenantBody {
    revoked_by: String,
}

async fn revoke_cross_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<RevokeCrossTenantBody>,
) -> ApiResult<StatusCode> {
    state.cross_tenant.revoke(id, &body.revoked_by).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct CrossTenantCheckQuery {
    source_tenant_id: Uuid,
    target_tenant_id: Uuid,
    resource_type: String,
    action: String,
}

async fn check_cross_tenant(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CrossTenantCheckQuery>,
) -> ApiResult<impl IntoResponse> {
    let allowed = state
        .cross_tenant
        .check(
            query.source_tenant_id,
            query.target_tenant_id,
            &query.resource_type,
            &query.action,
        )
        .await?;
    Ok(axum::Json(json!({ "allowed": allowed })))
}
