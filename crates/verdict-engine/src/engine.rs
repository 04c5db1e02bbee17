//! The authorization decision engine.
//!
//! Layered evaluation, strict order, first decisive layer wins:
//!
//! 1. active role load (none: deny)
//! 2. permission-set flattening
//! 3. super-admin shortcut
//! 4. direct permission match
//! 5. wildcard match (`MANAGE` on the type, `*` type on the action)
//! 6. resource scope: ownership, public read, resource policies
//! 7. tenant-level policies
//! 8. inherited permissions through the role hierarchy
//! 9. default deny
//!
//! Every internal error is caught and surfaced as
//! `Denied("Authorization check failed: ...")`; the decision path never
//! returns an error to the caller.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;
use verdict_core::error::VerdictResult;
use verdict_core::models::permission::Permission;
use verdict_core::models::policy::{PolicyBundle, PolicyEffect};
use verdict_core::models::user_role::UserRoleBinding;
use verdict_core::repository::{
    PolicyRepository, ResourceRepository, RolePermissionRepository, RoleRepository,
    UserRoleRepository,
};
use verdict_events::{AuthzEvent, EventSink};

use crate::cache::{DecisionCache, DecisionKey};
use crate::evaluator::PolicyEvaluator;
use crate::request::{AuthzRequest, AuthzResponse};

const SUPER_ADMIN_ROLE: &str = "SUPER_ADMIN";
const MANAGE_ACTION: &str = "MANAGE";
const WILDCARD_RESOURCE: &str = "*";
const READ_ONLY_ACTIONS: [&str; 3] = ["READ", "VIEW", "LIST"];

pub struct AuthorizationEngine<UR, RR, RP, RES, POL> {
    user_roles: UR,
    roles: RR,
    role_permissions: RP,
    resources: RES,
    policies: POL,
    evaluator: PolicyEvaluator,
    cache: Arc<dyn DecisionCache>,
    events: Arc<dyn EventSink>,
    max_hierarchy_depth: usize,
}

impl<UR, RR, RP, RES, POL> AuthorizationEngine<UR, RR, RP, RES, POL>
where
    UR: UserRoleRepository,
    RR: RoleRepository,
    RP: RolePermissionRepository,
    RES: ResourceRepository,
    POL: PolicyRepository,
{
    pub fn new(
        user_roles: UR,
        roles: RR,
        role_permissions: RP,
        resources: RES,
        policies: POL,
        cache: Arc<dyn DecisionCache>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            user_roles,
            roles,
            role_permissions,
            resources,
            policies,
            evaluator: PolicyEvaluator::new(),
            cache,
            events,
            max_hierarchy_depth: 10,
        }
    }

    pub fn with_max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    /// The main decision entry point.
    pub async fn authorize(&self, request: &AuthzRequest) -> AuthzResponse {
        debug!(
            user_id = %request.user_id,
            tenant_id = %request.tenant_id,
            resource = %request.resource,
            action = %request.action,
            "Processing authorization request"
        );

        // Only context-free requests are cacheable: a resource id or
        // request attributes put state outside the cache key.
        let cache_key = self.cache_key(request);
        if let Some(key) = &cache_key
            && let Some(hit) = self.cache.get(key).await
        {
            debug!(user_id = %request.user_id, "Decision served from cache");
            return hit;
        }

        let response = match self.decide(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(user_id = %request.user_id, error = %e, "Authorization check failed");
                AuthzResponse::denied(format!("Authorization check failed: {e}"))
            }
        };

        if let Some(key) = cache_key {
            self.cache.put(key, response.clone()).await;
        }

        // Audit trail is fire-and-forget: the decision stands whether or
        // not the event makes it out.
        self.events
            .publish(AuthzEvent::AuthorizationChecked {
                user_id: request.user_id,
                tenant_id: request.tenant_id,
                resource: request.resource.clone(),
                action: request.action.clone(),
                allowed: response.allowed,
                reason: response.reason.clone(),
                ip_address: request.ip_address.clone(),
            })
            .await;

        response
    }

    /// Thin boolean wrapper over [`authorize`](Self::authorize).
    pub async fn has_permission(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> bool {
        let request = AuthzRequest::new(user_id, tenant_id, resource, action);
        self.authorize(&request).await.allowed
    }

    /// Sequential batch evaluation; each request is decided in isolation.
    pub async fn batch_authorize(
        &self,
        requests: &[AuthzRequest],
    ) -> Vec<(AuthzRequest, AuthzResponse)> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let response = self.authorize(request).await;
            results.push((request.clone(), response));
        }
        results
    }

    fn cache_key(&self, request: &AuthzRequest) -> Option<DecisionKey> {
        if request.resource_id.is_none()
            && request.target_tenant_id.is_none()
            && request.attributes.is_empty()
        {
            Some(DecisionKey {
                user_id: request.user_id,
                tenant_id: request.tenant_id,
                resource: request.resource.clone(),
                action: request.action.clone(),
            })
        } else {
            None
        }
    }

    async fn decide(&self, request: &AuthzRequest) -> VerdictResult<AuthzResponse> {
        let now = Utc::now();

        // 1. Active roles.
        let bindings = self
            .user_roles
            .find_active_bindings(request.user_id, request.tenant_id)
            .await?;

        if bindings.is_empty() {
            debug!(
                user_id = %request.user_id,
                tenant_id = %request.tenant_id,
                "User has no active roles"
            );
            return Ok(AuthzResponse::denied("User has no active roles"));
        }

        // 2. Flatten the valid permission set.
        let permissions = collect_permissions(&bindings, now);

        // 3. Super-admin shortcut.
        if bindings
            .iter()
            .any(|b| b.role.name == SUPER_ADMIN_ROLE && b.role.is_active)
        {
            info!(user_id = %request.user_id, "Super admin access granted");
            return Ok(AuthzResponse::allowed(
                "Super admin access granted",
                vec![SUPER_ADMIN_ROLE.to_string()],
            ));
        }

        // 4. Direct match.
        if permissions
            .iter()
            .any(|p| p.resource_type == request.resource && p.action == request.action)
        {
            return Ok(AuthzResponse::allowed(
                "Direct permission granted",
                permission_names(&permissions),
            ));
        }

        // 5. Wildcards: MANAGE on the resource type, or any-resource grant
        // of the requested action.
        let has_manage = permissions
            .iter()
            .any(|p| p.resource_type == request.resource && p.action == MANAGE_ACTION);
        let has_any_resource = permissions
            .iter()
            .any(|p| p.resource_type == WILDCARD_RESOURCE && p.action == request.action);
        if has_manage || has_any_resource {
            return Ok(AuthzResponse::allowed(
                "Wildcard permission granted",
                permission_names(&permissions),
            ));
        }

        // 6. Resource scope.
        if let Some(resource_id) = request.resource_id.as_deref()
            && let Some(decision) = self
                .evaluate_resource_layer(resource_id, request, &permissions)
                .await?
        {
            return Ok(decision);
        }

        // 7. Tenant-level policies.
        let tenant_policies = self
            .policies
            .find_active_for_tenant(request.tenant_id, now)
            .await?;
        match self.evaluate_policy_layer(&tenant_policies, request, &permissions) {
            Some(PolicyEffect::Deny) => {
                return Ok(AuthzResponse::denied("Tenant policy denies access"));
            }
            Some(PolicyEffect::Allow) => {
                return Ok(AuthzResponse::allowed(
                    "Tenant policy allows access",
                    permission_names(&permissions),
                ));
            }
            None => {}
        }

        // 8. Inherited permissions through the role hierarchy.
        if self.check_inherited(&bindings, request).await? {
            return Ok(AuthzResponse::allowed(
                "Inherited permission granted",
                permission_names(&permissions),
            ));
        }

        // 9. Default deny.
        info!(
            user_id = %request.user_id,
            resource = %request.resource,
            action = %request.action,
            "Authorization denied"
        );
        Ok(AuthzResponse::denied(format!(
            "No permission for {}:{}",
            request.resource, request.action
        )))
    }

    /// Layer 6: ownership, public read, then the resource's own policies.
    /// `None` means fall through to the tenant layer.
    async fn evaluate_resource_layer(
        &self,
        resource_id: &str,
        request: &AuthzRequest,
        permissions: &[Permission],
    ) -> VerdictResult<Option<AuthzResponse>> {
        let Some(loaded) = self
            .resources
            .get_by_identifier_with_policies(resource_id)
            .await?
        else {
            debug!(resource_id, "Resource not found, skipping resource layer");
            return Ok(None);
        };

        let resource = &loaded.resource;

        if resource.owner_id == Some(request.user_id) {
            debug!(resource_id, user_id = %request.user_id, "Resource owner access");
            return Ok(Some(AuthzResponse::allowed(
                "Resource owner access granted",
                vec!["OWNER".to_string()],
            )));
        }

        if resource.is_public && READ_ONLY_ACTIONS.contains(&request.action.as_str()) {
            debug!(resource_id, "Public resource access");
            return Ok(Some(AuthzResponse::allowed(
                "Public resource access granted",
                vec!["PUBLIC_ACCESS".to_string()],
            )));
        }

        match self.evaluate_policy_layer(&loaded.policies, request, permissions) {
            Some(PolicyEffect::Deny) => Ok(Some(AuthzResponse::denied(
                "Resource policy denies access",
            ))),
            Some(PolicyEffect::Allow) => Ok(Some(AuthzResponse::allowed(
                "Resource policy allows access",
                permission_names(permissions),
            ))),
            None => Ok(None),
        }
    }

    /// Evaluates a pre-sorted policy list. DENY is decisive immediately,
    /// the first ALLOW wins, anything else falls through.
    fn evaluate_policy_layer(
        &self,
        bundles: &[PolicyBundle],
        request: &AuthzRequest,
        permissions: &[Permission],
    ) -> Option<PolicyEffect> {
        let now = Utc::now();
        for bundle in bundles {
            if !bundle.policy.is_active {
                continue;
            }
            match self.evaluator.evaluate(bundle, request, permissions, now) {
                Some(PolicyEffect::Deny) => {
                    debug!(policy = %bundle.policy.name, "Policy denies access");
                    return Some(PolicyEffect::Deny);
                }
                Some(PolicyEffect::Allow) => {
                    debug!(policy = %bundle.policy.name, "Policy allows access");
                    return Some(PolicyEffect::Allow);
                }
                None => {}
            }
        }
        None
    }

    /// Layer 8: walk each role's parent chain looking for a direct match.
    /// The walk is cycle-guarded and depth-bounded.
    async fn check_inherited(
        &self,
        bindings: &[UserRoleBinding],
        request: &AuthzRequest,
    ) -> VerdictResult<bool> {
        let now = Utc::now();
        let mut visited: HashSet<Uuid> = HashSet::new();

        for binding in bindings {
            if !binding.assignment.is_live(now) || !binding.role.is_active {
                continue;
            }
            visited.insert(binding.role.id);

            let mut next_parent = binding.role.parent_role_id;
            let mut depth = 0;

            while let Some(parent_id) = next_parent {
                if depth >= self.max_hierarchy_depth || !visited.insert(parent_id) {
                    break;
                }
                depth += 1;

                let parent = self.roles.get_by_id(parent_id).await?;
                if !parent.is_active {
                    break;
                }

                let grants = self.role_permissions.list_active_grants(parent.id).await?;
                let matched = grants.iter().any(|g| {
                    g.permission.resource_type == request.resource
                        && g.permission.action == request.action
                        && g.permission.is_active
                        && g.grant.is_live(now)
                });
                if matched {
                    debug!(
                        user_id = %request.user_id,
                        ancestor = %parent.name,
                        "Inherited permission found"
                    );
                    return Ok(true);
                }

                next_parent = parent.parent_role_id;
            }
        }

        Ok(false)
    }
}

/// Flattens the valid permissions out of the bindings: live assignment,
/// active role, live grant, active permission. Duplicates collapse on
/// `(resource_type, action)`.
fn collect_permissions(
    bindings: &[UserRoleBinding],
    now: chrono::DateTime<Utc>,
) -> Vec<Permission> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut permissions = Vec::new();

    for binding in bindings {
        if !binding.assignment.is_live(now) || !binding.role.is_active {
            continue;
        }
        for grant in &binding.grants {
            if !grant.grant.is_live(now) || !grant.permission.is_active {
                continue;
            }
            let key = (
                grant.permission.resource_type.clone(),
                grant.permission.action.clone(),
            );
            if seen.insert(key) {
                permissions.push(grant.permission.clone());
            }
        }
    }

    permissions
}

/// Sorted `TYPE:ACTION` names of the permission set.
fn permission_names(permissions: &[Permission]) -> Vec<String> {
    let mut names: Vec<String> = permissions.iter().map(|p| p.qualified_name()).collect();
    names.sort();
    names
}
