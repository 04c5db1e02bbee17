//! Policy evaluator.
//!
//! Evaluates one policy bundle against a request and the user's
//! pre-computed permission set. The outcome is tri-state: `Some(Allow)`,
//! `Some(Deny)`, or `None` (not applicable).
//!
//! Error policy: a failure inside a single policy evaluation denies
//! (fail-closed); when composing many policies in `batch_evaluate`, a
//! failing policy is skipped as not-applicable and evaluation continues.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, error};
use verdict_core::models::permission::Permission;
use verdict_core::models::policy::{PolicyBundle, PolicyEffect, PolicyType};

use crate::expr::{self, ExprContext, ExprError};
use crate::request::AuthzRequest;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("condition error: {0}")]
    Condition(String),
    #[error("invalid timezone '{0}'")]
    Timezone(String),
}

#[derive(Clone, Default)]
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates one policy. Errors deny (fail-closed).
    pub fn evaluate(
        &self,
        bundle: &PolicyBundle,
        request: &AuthzRequest,
        permissions: &[Permission],
        now: DateTime<Utc>,
    ) -> Option<PolicyEffect> {
        if !is_policy_active(bundle, now) {
            debug!(policy = %bundle.policy.name, "Policy inactive or outside date window");
            return None;
        }

        match self.evaluate_flavor(bundle, request, permissions, now) {
            Ok(effect) => {
                debug!(policy = %bundle.policy.name, ?effect, "Policy evaluated");
                effect
            }
            Err(e) => {
                error!(policy = %bundle.policy.name, error = %e, "Policy evaluation failed, denying");
                Some(PolicyEffect::Deny)
            }
        }
    }

    /// Evaluates one policy for composition: errors skip the policy
    /// instead of denying.
    pub fn evaluate_lenient(
        &self,
        bundle: &PolicyBundle,
        request: &AuthzRequest,
        permissions: &[Permission],
        now: DateTime<Utc>,
    ) -> Option<PolicyEffect> {
        if !is_policy_active(bundle, now) {
            return None;
        }

        match self.evaluate_flavor(bundle, request, permissions, now) {
            Ok(effect) => effect,
            Err(e) => {
                error!(policy = %bundle.policy.name, error = %e, "Policy evaluation failed, skipping");
                None
            }
        }
    }

    /// Combines many policies: priority descending, DENY short-circuits,
    /// at least one ALLOW is required, default deny.
    pub fn batch_evaluate(
        &self,
        bundles: &[PolicyBundle],
        request: &AuthzRequest,
        permissions: &[Permission],
        now: DateTime<Utc>,
    ) -> PolicyEffect {
        let mut sorted: Vec<&PolicyBundle> = bundles.iter().collect();
        sorted.sort_by(|a, b| b.policy.priority.cmp(&a.policy.priority));

        let mut has_allow = false;
        for bundle in sorted {
            match self.evaluate_lenient(bundle, request, permissions, now) {
                Some(PolicyEffect::Deny) => {
                    debug!(policy = %bundle.policy.name, "DENY short-circuits batch evaluation");
                    return PolicyEffect::Deny;
                }
                Some(PolicyEffect::Allow) => has_allow = true,
                None => {}
            }
        }

        if has_allow {
            PolicyEffect::Allow
        } else {
            PolicyEffect::Deny
        }
    }

    fn evaluate_flavor(
        &self,
        bundle: &PolicyBundle,
        request: &AuthzRequest,
        permissions: &[Permission],
        now: DateTime<Utc>,
    ) -> Result<Option<PolicyEffect>, EvalError> {
        match bundle.policy.policy_type {
            PolicyType::ResourceBased => evaluate_resource_based(bundle, request, permissions),
            PolicyType::IdentityBased => evaluate_identity_based(bundle, request),
            PolicyType::AttributeBased => {
                Ok(evaluate_attribute_based(bundle, request, permissions, now))
            }
            PolicyType::TimeBased => evaluate_time_based(bundle, request, now),
            PolicyType::Conditional => {
                Ok(evaluate_conditional(bundle, request, permissions, now))
            }
        }
    }
}

/// Activation gate: active flag plus date window. The window is
/// inclusive at the start and exclusive at the end, so a policy whose
/// end date is exactly `now` no longer applies.
fn is_policy_active(bundle: &PolicyBundle, now: DateTime<Utc>) -> bool {
    let policy = &bundle.policy;
    if !policy.is_active {
        return false;
    }
    if let Some(start) = policy.start_date
        && start > now
    {
        return false;
    }
    if let Some(end) = policy.end_date
        && end <= now
    {
        return false;
    }
    true
}

fn conditions_object(policy_conditions: &Value) -> HashMap<String, Value> {
    match policy_conditions {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => HashMap::new(),
    }
}

// ---------------------------------------------------------------------------
// RESOURCE_BASED
// ---------------------------------------------------------------------------

fn evaluate_resource_based(
    bundle: &PolicyBundle,
    request: &AuthzRequest,
    permissions: &[Permission],
) -> Result<Option<PolicyEffect>, EvalError> {
    // The policy must reference the requested resource, either by the
    // concrete identifier or by its type.
    let resource_matches = bundle.resources.iter().any(|r| {
        request
            .resource_id
            .as_deref()
            .is_some_and(|id| r.resource_identifier == id)
            || r.resource_type == request.resource
    });

    if !resource_matches && request.resource_id.is_some() {
        return Ok(None);
    }

    // The user must hold at least one active permission matching a
    // permission the policy references. A policy with no referenced
    // permissions never applies.
    let has_required = bundle.permissions.iter().any(|policy_perm| {
        permissions.iter().any(|user_perm| {
            user_perm.resource_type == policy_perm.resource_type
                && user_perm.action == policy_perm.action
                && user_perm.is_active
        })
    });

    if !has_required {
        return Ok(None);
    }

    let conditions = conditions_object(&bundle.policy.conditions);
    if !conditions.is_empty() && !evaluate_simple_conditions(&conditions, request)? {
        return Ok(None);
    }

    Ok(Some(bundle.policy.effect))
}

// ---------------------------------------------------------------------------
// IDENTITY_BASED
// ---------------------------------------------------------------------------

fn evaluate_identity_based(
    bundle: &PolicyBundle,
    request: &AuthzRequest,
) -> Result<Option<PolicyEffect>, EvalError> {
    let conditions = conditions_object(&bundle.policy.conditions);

    if let Some(user_condition) = conditions.get("userId") {
        let expected = value_to_plain_string(user_condition);
        if expected != request.user_id.to_string() {
            return Ok(None);
        }
    }

    if let Some(groups_condition) = conditions.get("groups") {
        let Value::Array(required) = groups_condition else {
            return Err(EvalError::Condition(
                "'groups' condition must be a list".into(),
            ));
        };
        let Some(Value::Array(user_groups)) = request.attributes.get("groups") else {
            return Ok(None);
        };
        let in_any = required
            .iter()
            .any(|required_group| user_groups.iter().any(|g| g == required_group));
        if !in_any {
            return Ok(None);
        }
    }

    // The requested operation must be among the policy's referenced
    // permissions; an empty reference set never applies.
    let action_matches = bundle
        .permissions
        .iter()
        .any(|p| p.resource_type == request.resource && p.action == request.action);

    if !action_matches {
        return Ok(None);
    }

    Ok(Some(bundle.policy.effect))
}

// ---------------------------------------------------------------------------
// ATTRIBUTE_BASED
// ---------------------------------------------------------------------------

fn evaluate_attribute_based(
    bundle: &PolicyBundle,
    request: &AuthzRequest,
    permissions: &[Permission],
    now: DateTime<Utc>,
) -> Option<PolicyEffect> {
    let conditions = conditions_object(&bundle.policy.conditions);
    let context = build_expr_context(request, permissions, now);

    for (name, condition) in &conditions {
        let Value::String(expression) = condition else {
            debug!(policy = %bundle.policy.name, condition = %name, "Condition is not an expression string");
            return None;
        };
        match expr::evaluate(expression, &context) {
            Ok(true) => {}
            Ok(false) => {
                debug!(policy = %bundle.policy.name, condition = %name, "Condition failed");
                return None;
            }
            Err(e) => {
                error!(policy = %bundle.policy.name, condition = %name, error = %e, "Condition errored");
                return None;
            }
        }
    }

    Some(bundle.policy.effect)
}

// ---------------------------------------------------------------------------
// TIME_BASED
// ---------------------------------------------------------------------------

fn evaluate_time_based(
    bundle: &PolicyBundle,
    request: &AuthzRequest,
    now: DateTime<Utc>,
) -> Result<Option<PolicyEffect>, EvalError> {
    let conditions = conditions_object(&bundle.policy.conditions);

    // All clock comparisons run in the policy's timezone when one is
    // set, UTC otherwise. An unknown zone is an evaluation error.
    let (date, time, weekday) = match conditions.get("timezone") {
        Some(tz_value) => {
            let tz_name = value_to_plain_string(tz_value);
            let tz: Tz = tz_name
                .parse()
                .map_err(|_| EvalError::Timezone(tz_name.clone()))?;
            let local = now.with_timezone(&tz);
            (local.date_naive(), local.time(), local.weekday())
        }
        None => (now.date_naive(), now.time(), now.weekday()),
    };

    if let Some(allowed_hours) = conditions.get("allowedHours") {
        let spec = value_to_plain_string(allowed_hours);
        let current = format!("{:02}:{:02}", time.hour(), time.minute());
        if !within_hour_range(&current, &spec) {
            return Ok(None);
        }
    }

    if let Some(allowed_days) = conditions.get("allowedDays") {
        let spec = value_to_plain_string(allowed_days);
        if !day_allowed(weekday, &spec) {
            return Ok(None);
        }
    }

    if let Some(date_range) = conditions.get("dateRange") {
        let spec = value_to_plain_string(date_range);
        if !within_date_range(date, &spec) {
            return Ok(None);
        }
    }

    if let Some(allowed_actions) = conditions.get("allowedActions") {
        let Value::Array(actions) = allowed_actions else {
            return Err(EvalError::Condition(
                "'allowedActions' must be a list".into(),
            ));
        };
        let matches = actions
            .iter()
            .any(|a| value_to_plain_string(a) == request.action);
        if !matches {
            return Ok(None);
        }
    }

    Ok(Some(bundle.policy.effect))
}

/// `"HH:MM-HH:MM"`, inclusive on both ends. A malformed spec never
/// matches.
fn within_hour_range(current: &str, spec: &str) -> bool {
    let Some((start, end)) = spec.split_once('-') else {
        return false;
    };
    current >= start.trim() && current <= end.trim()
}

/// Comma-separated day names, full (`MONDAY`) or three-letter (`MON`),
/// case-insensitive.
fn day_allowed(weekday: Weekday, spec: &str) -> bool {
    let full = match weekday {
        Weekday::Mon => "MONDAY",
        Weekday::Tue => "TUESDAY",
        Weekday::Wed => "WEDNESDAY",
        Weekday::Thu => "THURSDAY",
        Weekday::Fri => "FRIDAY",
        Weekday::Sat => "SATURDAY",
        Weekday::Sun => "SUNDAY",
    };
    spec.split(',').any(|day| {
        let day = day.trim().to_uppercase();
        day == full || day == full[..3]
    })
}

/// `"yyyy-MM-dd to yyyy-MM-dd"`, inclusive. A malformed spec never
/// matches.
fn within_date_range(date: NaiveDate, spec: &str) -> bool {
    let Some((start, end)) = spec.split_once(" to ") else {
        return false;
    };
    let (Ok(start), Ok(end)) = (
        NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d"),
        NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d"),
    ) else {
        return false;
    };
    date >= start && date <= end
}

// ---------------------------------------------------------------------------
// CONDITIONAL
// ---------------------------------------------------------------------------

fn evaluate_conditional(
    bundle: &PolicyBundle,
    request: &AuthzRequest,
    permissions: &[Permission],
    now: DateTime<Utc>,
) -> Option<PolicyEffect> {
    let conditions = conditions_object(&bundle.policy.conditions);

    let Some(Value::String(expression)) = conditions.get("expression") else {
        error!(policy = %bundle.policy.name, "Conditional policy missing 'expression'");
        return None;
    };

    let context = build_expr_context(request, permissions, now);
    match expr::evaluate(expression, &context) {
        Ok(true) => Some(bundle.policy.effect),
        Ok(false) => None,
        Err(e) => {
            error!(policy = %bundle.policy.name, error = %e, "Conditional expression errored");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Expression context
// ---------------------------------------------------------------------------

fn build_expr_context(
    request: &AuthzRequest,
    permissions: &[Permission],
    now: DateTime<Utc>,
) -> ExprContext {
    let permission_names: Vec<Value> = {
        let mut names: Vec<String> = permissions
            .iter()
            .map(|p| p.qualified_name())
            .collect();
        names.sort();
        names.into_iter().map(Value::String).collect()
    };

    let mut variables = HashMap::new();
    variables.insert("userId".into(), Value::String(request.user_id.to_string()));
    variables.insert(
        "tenantId".into(),
        Value::String(request.tenant_id.to_string()),
    );
    variables.insert("resource".into(), Value::String(request.resource.clone()));
    variables.insert("action".into(), Value::String(request.action.clone()));
    variables.insert(
        "resourceId".into(),
        request
            .resource_id
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    variables.insert(
        "attributes".into(),
        Value::Object(request.attributes.clone()),
    );
    variables.insert(
        "ipAddress".into(),
        request
            .ip_address
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    variables.insert(
        "userAgent".into(),
        request
            .user_agent
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    variables.insert(
        "permissions".into(),
        Value::Array(permission_names.clone()),
    );
    variables.insert("permissionNames".into(), Value::Array(permission_names));
    variables.insert("now".into(), Value::String(now.to_rfc3339()));
    variables.insert(
        "currentTime".into(),
        Value::String(format!(
            "{:02}:{:02}:{:02}",
            now.hour(),
            now.minute(),
            now.second()
        )),
    );
    variables.insert(
        "dayOfWeek".into(),
        Value::String(
            match now.weekday() {
                Weekday::Mon => "MONDAY",
                Weekday::Tue => "TUESDAY",
                Weekday::Wed => "WEDNESDAY",
                Weekday::Thu => "THURSDAY",
                Weekday::Fri => "FRIDAY",
                Weekday::Sat => "SATURDAY",
                Weekday::Sun => "SUNDAY",
            }
            .to_string(),
        ),
    );
    variables.insert("hour".into(), Value::Number(now.hour().into()));

    let permission_pairs: HashSet<(String, String)> = permissions
        .iter()
        .map(|p| (p.resource_type.clone(), p.action.clone()))
        .collect();

    ExprContext::new(variables, permission_pairs)
}

// ---------------------------------------------------------------------------
// Simple comparator (non-expression conditions)
// ---------------------------------------------------------------------------

/// Key-by-key comparison of a condition map against the request:
/// `regex:<pattern>` matches, `gt:`/`lt:` compare numerically, list
/// values test containment, anything else compares for equality.
fn evaluate_simple_conditions(
    conditions: &HashMap<String, Value>,
    request: &AuthzRequest,
) -> Result<bool, EvalError> {
    for (key, expected) in conditions {
        let actual = request_value(key, request);
        if !compare_condition(expected, &actual)? {
            debug!(condition = %key, "Simple condition failed");
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_condition(expected: &Value, actual: &Value) -> Result<bool, EvalError> {
    if let Value::String(spec) = expected {
        if let Some(pattern) = spec.strip_prefix("regex:") {
            let regex = regex::Regex::new(pattern)
                .map_err(|e| EvalError::Condition(format!("bad regex '{pattern}': {e}")))?;
            return Ok(regex.is_match(&value_to_plain_string(actual)));
        }
        if let Some(threshold) = spec.strip_prefix("gt:") {
            return numeric_compare(threshold, actual).map(|ordering| ordering.is_gt());
        }
        if let Some(threshold) = spec.strip_prefix("lt:") {
            return numeric_compare(threshold, actual).map(|ordering| ordering.is_lt());
        }
    }

    if let Value::Array(options) = expected {
        return Ok(options.iter().any(|option| json_loose_eq(option, actual)));
    }

    Ok(json_loose_eq(expected, actual))
}

fn numeric_compare(threshold: &str, actual: &Value) -> Result<std::cmp::Ordering, EvalError> {
    let threshold: f64 = threshold
        .trim()
        .parse()
        .map_err(|e| EvalError::Condition(format!("bad numeric threshold: {e}")))?;
    let actual: f64 = value_to_plain_string(actual)
        .parse()
        .map_err(|e| EvalError::Condition(format!("non-numeric actual value: {e}")))?;
    actual
        .partial_cmp(&threshold)
        .ok_or_else(|| EvalError::Condition("NaN comparison".into()))
}

fn json_loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves a condition key against the request. Dotted keys reach into
/// `attributes`; bare well-known keys read request fields; anything else
/// falls back to a direct attribute lookup.
fn request_value(key: &str, request: &AuthzRequest) -> Value {
    if let Some((head, rest)) = key.split_once('.')
        && head == "attributes"
    {
        return request.attributes.get(rest).cloned().unwrap_or(Value::Null);
    }

    match key {
        "userId" => Value::String(request.user_id.to_string()),
        "tenantId" => Value::String(request.tenant_id.to_string()),
        "resource" => Value::String(request.resource.clone()),
        "action" => Value::String(request.action.clone()),
        "resourceId" => request
            .resource_id
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "ipAddress" => request
            .ip_address
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "userAgent" => request
            .user_agent
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        other => request.attributes.get(other).cloned().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;
    use verdict_core::models::permission::RiskLevel;
    use verdict_core::models::policy::{Policy, PolicyResourceRef};

    fn permission(resource_type: &str, action: &str) -> Permission {
        Permission {
            id: Uuid::new_v4(),
            resource_type: resource_type.into(),
            action: action.into(),
            description: String::new(),
            risk_level: RiskLevel::Low,
            requires_mfa: false,
            requires_approval: false,
            is_system: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    fn policy(policy_type: PolicyType, effect: PolicyEffect, conditions: Value) -> Policy {
        Policy {
            id: Uuid::new_v4(),
            tenant_id: Some(Uuid::new_v4()),
            name: "test-policy".into(),
            description: String::new(),
            policy_type,
            effect,
            conditions,
            priority: 100,
            is_active: true,
            is_system: false,
            start_date: None,
            end_date: None,
            created_by: "SYSTEM".into(),
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    fn bundle(policy: Policy, permissions: Vec<Permission>) -> PolicyBundle {
        PolicyBundle {
            policy,
            permissions,
            resources: Vec::new(),
        }
    }

    fn request(resource: &str, action: &str) -> AuthzRequest {
        AuthzRequest::new(Uuid::new_v4(), Uuid::new_v4(), resource, action)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        // 2026-06-01 is a Monday.
        Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn activation_gate_boundaries() {
        let now = at(12);
        let evaluator = PolicyEvaluator::new();
        let req = request("DATASET", "UPDATE");
        let perms = vec![permission("DATASET", "UPDATE")];

        // start_date == now: active.
        let mut p = policy(
            PolicyType::TimeBased,
            PolicyEffect::Allow,
            json!({}),
        );
        p.start_date = Some(now);
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &perms, now),
            Some(PolicyEffect::Allow)
        );

        // end_date == now: inactive.
        let mut p = policy(PolicyType::TimeBased, PolicyEffect::Allow, json!({}));
        p.end_date = Some(now);
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &perms, now),
            None
        );

        // is_active = false: never applicable.
        let mut p = policy(PolicyType::TimeBased, PolicyEffect::Allow, json!({}));
        p.is_active = false;
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &perms, now),
            None
        );
    }

    #[test]
    fn time_based_hours_window() {
        let evaluator = PolicyEvaluator::new();
        let req = request("DATASET", "UPDATE");
        let p = policy(
            PolicyType::TimeBased,
            PolicyEffect::Deny,
            json!({"allowedHours": "09:00-17:00", "timezone": "UTC"}),
        );
        let b = bundle(p, vec![]);

        // 02:00 UTC: outside window, not applicable.
        assert_eq!(evaluator.evaluate(&b, &req, &[], at(2)), None);
        // 10:00 UTC: inside window, DENY applies.
        assert_eq!(
            evaluator.evaluate(&b, &req, &[], at(10)),
            Some(PolicyEffect::Deny)
        );
    }

    #[test]
    fn time_based_days_and_actions() {
        let evaluator = PolicyEvaluator::new();
        let req = request("DATASET", "UPDATE");

        let p = policy(
            PolicyType::TimeBased,
            PolicyEffect::Allow,
            json!({"allowedDays": "MON,TUE", "allowedActions": ["UPDATE"]}),
        );
        // 2026-06-01 is a Monday.
        assert_eq!(
            evaluator.evaluate(&bundle(p.clone(), vec![]), &req, &[], at(10)),
            Some(PolicyEffect::Allow)
        );

        let other_action = request("DATASET", "DELETE");
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &other_action, &[], at(10)),
            None
        );

        let p = policy(
            PolicyType::TimeBased,
            PolicyEffect::Allow,
            json!({"allowedDays": "SATURDAY,SUNDAY"}),
        );
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &[], at(10)),
            None
        );
    }

    #[test]
    fn time_based_bad_timezone_denies() {
        let evaluator = PolicyEvaluator::new();
        let req = request("DATASET", "UPDATE");
        let p = policy(
            PolicyType::TimeBased,
            PolicyEffect::Allow,
            json!({"timezone": "Not/AZone"}),
        );
        // Fail-closed: evaluation error inside a policy denies.
        assert_eq!(
            evaluator.evaluate(&bundle(p.clone(), vec![]), &req, &[], at(10)),
            Some(PolicyEffect::Deny)
        );
        // Lenient composition skips the failing policy.
        assert_eq!(
            evaluator.evaluate_lenient(&bundle(p, vec![]), &req, &[], at(10)),
            None
        );
    }

    #[test]
    fn time_based_date_range() {
        let evaluator = PolicyEvaluator::new();
        let req = request("DATASET", "UPDATE");
        let p = policy(
            PolicyType::TimeBased,
            PolicyEffect::Allow,
            json!({"dateRange": "2026-05-01 to 2026-06-30"}),
        );
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &[], at(10)),
            Some(PolicyEffect::Allow)
        );

        let p = policy(
            PolicyType::TimeBased,
            PolicyEffect::Allow,
            json!({"dateRange": "2026-07-01 to 2026-07-31"}),
        );
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &[], at(10)),
            None
        );
    }

    #[test]
    fn resource_based_requires_referenced_permission() {
        let evaluator = PolicyEvaluator::new();
        let req = request("DATASET", "READ");
        let user_perms = vec![permission("DATASET", "READ")];

        // Policy referencing DATASET:READ, which the user holds: applies.
        let p = policy(PolicyType::ResourceBased, PolicyEffect::Allow, json!({}));
        let b = bundle(p, vec![permission("DATASET", "READ")]);
        assert_eq!(
            evaluator.evaluate(&b, &req, &user_perms, at(10)),
            Some(PolicyEffect::Allow)
        );

        // Empty referenced-permission set: never applicable.
        let p = policy(PolicyType::ResourceBased, PolicyEffect::Allow, json!({}));
        let b = bundle(p, vec![]);
        assert_eq!(evaluator.evaluate(&b, &req, &user_perms, at(10)), None);
    }

    #[test]
    fn resource_based_identifier_mismatch_not_applicable() {
        let evaluator = PolicyEvaluator::new();
        let mut req = request("DATASET", "READ");
        req.resource_id = Some("ds-42".into());
        let user_perms = vec![permission("DATASET", "READ")];

        let p = policy(PolicyType::ResourceBased, PolicyEffect::Deny, json!({}));
        let mut b = bundle(p, vec![permission("DATASET", "READ")]);
        b.resources.push(PolicyResourceRef {
            resource_id: Uuid::new_v4(),
            resource_identifier: "ds-99".into(),
            resource_type: "OTHER".into(),
        });

        assert_eq!(evaluator.evaluate(&b, &req, &user_perms, at(10)), None);
    }

    #[test]
    fn resource_based_simple_conditions() {
        let evaluator = PolicyEvaluator::new();
        let mut req = request("DATASET", "READ");
        req.attributes
            .insert("department".into(), json!("FINANCE"));
        req.attributes.insert("clearance".into(), json!(5));
        req.ip_address = Some("10.0.0.8".into());
        let user_perms = vec![permission("DATASET", "READ")];

        let p = policy(
            PolicyType::ResourceBased,
            PolicyEffect::Allow,
            json!({
                "attributes.department": ["FINANCE", "AUDIT"],
                "attributes.clearance": "gt:3",
                "ipAddress": "regex:^10\\..*",
            }),
        );
        let b = bundle(p, vec![permission("DATASET", "READ")]);
        assert_eq!(
            evaluator.evaluate(&b, &req, &user_perms, at(10)),
            Some(PolicyEffect::Allow)
        );

        // Failing threshold makes the policy not applicable.
        req.attributes.insert("clearance".into(), json!(2));
        assert_eq!(evaluator.evaluate(&b, &req, &user_perms, at(10)), None);
    }

    #[test]
    fn identity_based_matches_user_and_groups() {
        let evaluator = PolicyEvaluator::new();
        let mut req = request("REPORT", "READ");
        req.attributes
            .insert("groups".into(), json!(["analysts"]));

        let p = policy(
            PolicyType::IdentityBased,
            PolicyEffect::Allow,
            json!({"userId": req.user_id.to_string(), "groups": ["analysts", "admins"]}),
        );
        let b = bundle(p, vec![permission("REPORT", "READ")]);
        assert_eq!(
            evaluator.evaluate(&b, &req, &[], at(10)),
            Some(PolicyEffect::Allow)
        );

        // Different user: not applicable.
        let p = policy(
            PolicyType::IdentityBased,
            PolicyEffect::Allow,
            json!({"userId": Uuid::new_v4().to_string()}),
        );
        let b = bundle(p, vec![permission("REPORT", "READ")]);
        assert_eq!(evaluator.evaluate(&b, &req, &[], at(10)), None);

        // User not in any required group: not applicable.
        let p = policy(
            PolicyType::IdentityBased,
            PolicyEffect::Allow,
            json!({"groups": ["admins"]}),
        );
        let b = bundle(p, vec![permission("REPORT", "READ")]);
        assert_eq!(evaluator.evaluate(&b, &req, &[], at(10)), None);
    }

    #[test]
    fn attribute_based_all_conditions_must_hold() {
        let evaluator = PolicyEvaluator::new();
        let mut req = request("DATASET", "READ");
        req.attributes
            .insert("department".into(), json!("FINANCE"));

        let p = policy(
            PolicyType::AttributeBased,
            PolicyEffect::Allow,
            json!({
                "dept": "attributes.department == 'FINANCE'",
                "readonly": "action == 'READ'",
            }),
        );
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &[], at(10)),
            Some(PolicyEffect::Allow)
        );

        let p = policy(
            PolicyType::AttributeBased,
            PolicyEffect::Allow,
            json!({"dept": "attributes.department == 'HR'"}),
        );
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &[], at(10)),
            None
        );

        // Erroring expression: not applicable, not deny.
        let p = policy(
            PolicyType::AttributeBased,
            PolicyEffect::Allow,
            json!({"broken": "unboundName == 1"}),
        );
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &[], at(10)),
            None
        );
    }

    #[test]
    fn conditional_expression_with_helpers() {
        let evaluator = PolicyEvaluator::new();
        let req = request("REPORT", "EXPORT");
        let perms = vec![permission("REPORT", "READ"), permission("REPORT", "EXPORT")];

        let p = policy(
            PolicyType::Conditional,
            PolicyEffect::Allow,
            json!({"expression": "hasPermission('REPORT', 'EXPORT') && hour >= 9"}),
        );
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &perms, at(10)),
            Some(PolicyEffect::Allow)
        );

        // Missing expression key: not applicable.
        let p = policy(PolicyType::Conditional, PolicyEffect::Allow, json!({}));
        assert_eq!(
            evaluator.evaluate(&bundle(p, vec![]), &req, &perms, at(10)),
            None
        );
    }

    #[test]
    fn batch_deny_precedence() {
        let evaluator = PolicyEvaluator::new();
        let req = request("DATASET", "UPDATE");
        let perms = vec![permission("DATASET", "UPDATE")];

        let allow = bundle(
            {
                let mut p = policy(
                    PolicyType::Conditional,
                    PolicyEffect::Allow,
                    json!({"expression": "true"}),
                );
                p.priority = 10;
                p
            },
            vec![],
        );
        let deny = bundle(
            {
                let mut p = policy(
                    PolicyType::Conditional,
                    PolicyEffect::Deny,
                    json!({"expression": "true"}),
                );
                p.priority = 5;
                p
            },
            vec![],
        );

        // Lower-priority DENY still wins.
        assert_eq!(
            evaluator.batch_evaluate(
                &[allow.clone(), deny],
                &req,
                &perms,
                at(10)
            ),
            PolicyEffect::Deny
        );

        // Only an ALLOW present: allow.
        assert_eq!(
            evaluator.batch_evaluate(&[allow], &req, &perms, at(10)),
            PolicyEffect::Allow
        );

        // Nothing applicable: default deny.
        assert_eq!(
            evaluator.batch_evaluate(&[], &req, &perms, at(10)),
            PolicyEffect::Deny
        );
    }
}
