//! Policy management service.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use verdict_core::error::{VerdictError, VerdictResult};
use verdict_core::models::permission::Permission;
use verdict_core::models::policy::{CreatePolicy, Policy, PolicyEffect, UpdatePolicy};
use verdict_core::repository::{PaginatedResult, Pagination, PolicyRepository};
use verdict_engine::{AuthzRequest, PolicyEvaluator};
use verdict_engine::DecisionCache;
use verdict_events::{AuthzEvent, EventSink};

/// Outcome of a test-only policy evaluation.
#[derive(Debug, Clone)]
pub struct PolicyEvaluationOutcome {
    pub policy_id: Uuid,
    pub policy_name: String,
    pub effect: Option<PolicyEffect>,
    pub evaluated: bool,
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
}

pub struct PolicyService<POL> {
    policies: POL,
    evaluator: PolicyEvaluator,
    events: Arc<dyn EventSink>,
    cache: Arc<dyn DecisionCache>,
}

impl<POL: PolicyRepository> PolicyService<POL> {
    pub fn new(
        policies: POL,
        events: Arc<dyn EventSink>,
        cache: Arc<dyn DecisionCache>,
    ) -> Self {
        Self {
            policies,
            evaluator: PolicyEvaluator::new(),
            events,
            cache,
        }
    }

    pub async fn create(&self, input: CreatePolicy) -> VerdictResult<Policy> {
        info!(name = %input.name, tenant_id = ?input.tenant_id, "Creating policy");

        validate_name(&input.name)?;
        if let (Some(start), Some(end)) = (input.start_date, input.end_date)
            && end <= start
        {
            return Err(VerdictError::Validation {
                message: "Policy end date must be after its start date".into(),
            });
        }

        if self
            .policies
            .exists_by_name(input.tenant_id, &input.name)
            .await?
        {
            return Err(VerdictError::Duplicate {
                entity: format!("policy '{}'", input.name),
            });
        }

        let created_by = input.created_by.clone();
        let policy = self.policies.create(input).await?;

        self.cache.invalidate_all().await;
        self.events
            .publish(AuthzEvent::PolicyCreated {
                policy_id: policy.id,
                tenant_id: policy.tenant_id,
                policy_name: policy.name.clone(),
                created_by,
            })
            .await;

        info!(policy_id = %policy.id, "Policy created");
        Ok(policy)
    }

    pub async fn get(&self, id: Uuid) -> VerdictResult<Policy> {
        self.policies.get_by_id(id).await
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> VerdictResult<PaginatedResult<Policy>> {
        self.policies.list_by_tenant(tenant_id, pagination).await
    }

    pub async fn update(
        &self,
        id: Uuid,
        expected_version: u64,
        input: UpdatePolicy,
    ) -> VerdictResult<Policy> {
        let existing = self.policies.get_by_id(id).await?;

        if let Some(name) = &input.name
            && name != &existing.name
        {
            validate_name(name)?;
            if self.policies.exists_by_name(existing.tenant_id, name).await? {
                return Err(VerdictError::Duplicate {
                    entity: format!("policy '{name}'"),
                });
            }
        }

        let updated = self.policies.update(id, expected_version, input).await?;
        self.cache.invalidate_all().await;
        info!(policy_id = %id, "Policy updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> VerdictResult<()> {
        let existing = self.policies.get_by_id(id).await?;
        if existing.is_system {
            return Err(VerdictError::BusinessRule {
                message: "System policies cannot be deleted".into(),
            });
        }

        self.policies.delete(id).await?;
        self.cache.invalidate_all().await;
        info!(policy_id = %id, "Policy deleted");
        Ok(())
    }

    pub async fn activate(&self, id: Uuid) -> VerdictResult<()> {
        self.policies.set_active(id, true).await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    pub async fn deactivate(&self, id: Uuid) -> VerdictResult<()> {
        self.policies.set_active(id, false).await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    pub async fn add_permission(&self, policy_id: Uuid, permission_id: Uuid) -> VerdictResult<()> {
        // Ensure the policy exists before linking.
        self.policies.get_by_id(policy_id).await?;
        self.policies.add_permission(policy_id, permission_id).await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    pub async fn remove_permission(
        &self,
        policy_id: Uuid,
        permission_id: Uuid,
    ) -> VerdictResult<()> {
        self.policies
            .remove_permission(policy_id, permission_id)
            .await?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    /// Test-only evaluation: runs one policy against a request and the
    /// given permission set without touching the decision pipeline.
    pub async fn evaluate(
        &self,
        policy_id: Uuid,
        request: &AuthzRequest,
        permissions: &[Permission],
    ) -> VerdictResult<PolicyEvaluationOutcome> {
        let bundle = self.policies.get_bundle(policy_id).await?;
        let evaluated_at = Utc::now();
        let effect = self
            .evaluator
            .evaluate(&bundle, request, permissions, evaluated_at);

        let outcome = PolicyEvaluationOutcome {
            policy_id,
            policy_name: bundle.policy.name.clone(),
            effect,
            evaluated: true,
            reason: match effect {
                Some(_) => "Policy evaluated successfully".into(),
                None => "Policy not applicable".into(),
            },
            evaluated_at,
        };

        self.events
            .publish(AuthzEvent::PolicyEvaluated {
                policy_id,
                policy_name: outcome.policy_name.clone(),
                effect: effect.map(|e| format!("{e:?}")),
                evaluated_at,
            })
            .await;

        Ok(outcome)
    }
}

fn validate_name(name: &str) -> VerdictResult<()> {
    if name.is_empty() || name.len() > 100 {
        return Err(VerdictError::Validation {
            message: "Policy name must be 1-100 characters".into(),
        });
    }
    Ok(())
}
