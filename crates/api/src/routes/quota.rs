//! Quota status and entitlement check routes.
//!
//! Every check recounts usage from the owning tables and reconciles the
//! grace marker before evaluating, so the three-tier decision (soft cap,
//! grace window, hard cap) always runs against current truth.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use vigil_core::quota::{
    EffectiveQuotas, Entitlement, GraceState, QuotaAction, ResourceKind, UsageCounters,
    check_entitlement, enforce_hard_cap, projected_usage,
};
use vigil_db::repositories::{
    AuditEntry, AuditSeverity, PlanRepository, QuotaRepository, SubscriptionRepository,
    UsageRepository, plan::quotas_of,
};
use vigil_shared::AppError;
use vigil_shared::config::QuotaConfig;

use crate::AppState;
use crate::middleware::AuthUser;
use crate::routes::{catalog_error, db_error, error_response, record_audit, subscription_error};

const ALL_RESOURCES: [ResourceKind; 4] = [
    ResourceKind::Camera,
    ResourceKind::Caregiver,
    ResourceKind::Storage,
    ResourceKind::Site,
];

/// Creates the quota routes (requires auth middleware to be applied
/// externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quota/status/{user_id}", get(quota_status))
        .route("/quota/check-entitlement", post(check_entitlement_route))
        .route("/quota/check-soft-cap", post(check_soft_cap))
        .route("/quota/check-grace-period", post(check_grace_period))
        .route("/quota/enforce-hard-cap", post(enforce_hard_cap_route))
}

/// Grace window for one resource kind.
const fn grace_days_for(config: &QuotaConfig, resource: ResourceKind) -> i64 {
    match resource {
        ResourceKind::Camera => config.grace_days_camera,
        ResourceKind::Caregiver => config.grace_days_caregiver,
        ResourceKind::Storage => config.grace_days_storage,
        ResourceKind::Site => config.grace_days_site,
    }
}

/// Resolves which user a check targets. Admins may check anyone;
/// everyone else only themselves.
fn target_user(auth: &AuthUser, requested: Option<Uuid>) -> Result<Uuid, Response> {
    match requested {
        Some(id) if id != auth.user_id() && !auth.is_admin() => Err(error_response(
            &AppError::Forbidden("quota checks for other users require the admin role".to_string()),
        )),
        Some(id) => Ok(id),
        None => Ok(auth.user_id()),
    }
}

/// Live usage and resolved effective quotas for one user.
async fn evaluate(
    state: &AppState,
    user_id: Uuid,
) -> Result<(UsageCounters, EffectiveQuotas), Response> {
    let subs = SubscriptionRepository::new((*state.db).clone());
    let plans = PlanRepository::new((*state.db).clone());

    let plan_quotas = match subs.find_live_by_user(user_id).await {
        Ok(Some(sub)) => match plans.find_by_id(sub.plan_version_id).await {
            Ok(plan) => Some(quotas_of(&plan)),
            Err(e) => return Err(error_response(&catalog_error(e))),
        },
        Ok(None) => None,
        Err(e) => return Err(error_response(&subscription_error(e))),
    };

    let overrides = QuotaRepository::new((*state.db).clone())
        .get_overrides(user_id)
        .await
        .map_err(|e| error_response(&db_error(e)))?;
    let usage = UsageRepository::new((*state.db).clone())
        .counters(user_id)
        .await
        .map_err(|e| error_response(&db_error(e)))?;

    let quotas = EffectiveQuotas::resolve(
        overrides.as_ref(),
        plan_quotas.as_ref(),
        &state.config.quota,
    );

    Ok((usage, quotas))
}

/// GET `/quota/status/{user_id}` - Usage, limits and entitlement for
/// every resource.
async fn quota_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let user_id = match target_user(&auth, Some(user_id)) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (usage, quotas) = match evaluate(&state, user_id).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    let grace_repo = QuotaRepository::new((*state.db).clone());
    let now = Utc::now();
    let mut resources = serde_json::Map::new();
    for resource in ALL_RESOURCES {
        let used = usage.get(resource);
        let limit = quotas.get(resource);
        let over = limit.is_some_and(|l| used > l);

        let grace = match grace_repo.sync_grace(user_id, resource, over, now).await {
            Ok(g) => g,
            Err(e) => return error_response(&db_error(e)),
        };

        let entitlement = check_entitlement(
            resource,
            used,
            limit,
            state.config.quota.soft_cap_percent,
            grace,
            grace_days_for(&state.config.quota, resource),
            now,
        )
        .map_or_else(
            |e| json!({ "outcome": "exceeded", "message": e.to_string() }),
            |ent| json!(ent),
        );

        resources.insert(
            resource.to_string(),
            json!({
                "usage": used,
                "limit": limit,
                "entitlement": entitlement,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(json!({ "user_id": user_id, "resources": resources })),
    )
        .into_response()
}

/// Request body for an entitlement or hard-cap check.
#[derive(Debug, Deserialize)]
struct AdmissionRequest {
    /// Resource being checked.
    resource: ResourceKind,
    /// `add` admits one more unit; `use` checks current usage.
    action: QuotaAction,
    /// Target user; admin only, defaults to the caller.
    user_id: Option<Uuid>,
}

/// POST /quota/check-entitlement - Three-tier check (soft cap, grace,
/// hard cap) for an action.
async fn check_entitlement_route(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AdmissionRequest>,
) -> impl IntoResponse {
    let user_id = match target_user(&auth, payload.user_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (usage, quotas) = match evaluate(&state, user_id).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    let resource = payload.resource;
    let projected = projected_usage(usage.get(resource), payload.action);
    let limit = quotas.get(resource);
    let over = limit.is_some_and(|l| projected > l);
    let now = Utc::now();

    let grace = match QuotaRepository::new((*state.db).clone())
        .sync_grace(user_id, resource, over, now)
        .await
    {
        Ok(g) => g,
        Err(e) => return error_response(&db_error(e)),
    };

    match check_entitlement(
        resource,
        projected,
        limit,
        state.config.quota.soft_cap_percent,
        grace,
        grace_days_for(&state.config.quota, resource),
        now,
    ) {
        Ok(entitlement) => (
            StatusCode::OK,
            Json(json!({
                "allowed": true,
                "resource": resource,
                "usage": projected,
                "limit": limit,
                "entitlement": entitlement,
            })),
        )
            .into_response(),
        Err(e) => {
            record_audit(
                &state,
                AuditEntry {
                    actor_id: Some(auth.user_id()),
                    action: "quota.denied".to_string(),
                    resource: resource.to_string(),
                    severity: AuditSeverity::Warning,
                    detail: json!({ "user_id": user_id, "message": e.to_string() }),
                },
            )
            .await;

            error_response(&AppError::QuotaExceeded(e.to_string()))
        }
    }
}

/// Request body for a soft-cap or grace-period check.
#[derive(Debug, Deserialize)]
struct UsageCheckRequest {
    /// Resource being checked.
    resource: ResourceKind,
    /// Target user; admin only, defaults to the caller.
    user_id: Option<Uuid>,
}

/// POST /quota/check-soft-cap - Whether current usage has crossed the
/// warning threshold.
async fn check_soft_cap(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UsageCheckRequest>,
) -> impl IntoResponse {
    let user_id = match target_user(&auth, payload.user_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (usage, quotas) = match evaluate(&state, user_id).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    let resource = payload.resource;
    let used = usage.get(resource);
    let limit = quotas.get(resource);

    // Grace is irrelevant for the warning tier; a zero-day window makes
    // any overage surface as the hard-cap error.
    let (soft_capped, warning) = match check_entitlement(
        resource,
        used,
        limit,
        state.config.quota.soft_cap_percent,
        GraceState::default(),
        0,
        Utc::now(),
    ) {
        Ok(Entitlement::SoftWarn { warning }) => (true, Some(warning)),
        Ok(_) => (false, None),
        Err(e) => (true, Some(e.to_string())),
    };

    (
        StatusCode::OK,
        Json(json!({
            "resource": resource,
            "usage": used,
            "limit": limit,
            "soft_capped": soft_capped,
            "warning": warning,
        })),
    )
        .into_response()
}

/// POST /quota/check-grace-period - The grace window state for a
/// resource.
async fn check_grace_period(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UsageCheckRequest>,
) -> impl IntoResponse {
    let user_id = match target_user(&auth, payload.user_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (usage, quotas) = match evaluate(&state, user_id).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    let resource = payload.resource;
    let used = usage.get(resource);
    let limit = quotas.get(resource);
    let over = limit.is_some_and(|l| used > l);
    let now = Utc::now();

    let grace = match QuotaRepository::new((*state.db).clone())
        .sync_grace(user_id, resource, over, now)
        .await
    {
        Ok(g) => g,
        Err(e) => return error_response(&db_error(e)),
    };

    let grace_days = grace_days_for(&state.config.quota, resource);
    let days_remaining = grace
        .exceeded_at
        .map(|at| (grace_days - (now - at).num_days()).max(0));

    (
        StatusCode::OK,
        Json(json!({
            "resource": resource,
            "usage": used,
            "limit": limit,
            "over_quota": over,
            "exceeded_at": grace.exceeded_at,
            "grace_days": grace_days,
            "days_remaining": days_remaining,
        })),
    )
        .into_response()
}

/// POST /quota/enforce-hard-cap - Admission decision for an action.
///
/// Callers of `add`-type actions must refuse to persist the resource
/// when this denies.
async fn enforce_hard_cap_route(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AdmissionRequest>,
) -> impl IntoResponse {
    let user_id = match target_user(&auth, payload.user_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (usage, quotas) = match evaluate(&state, user_id).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    let resource = payload.resource;
    let projected = projected_usage(usage.get(resource), payload.action);
    let limit = quotas.get(resource);
    let over = limit.is_some_and(|l| projected > l);
    let now = Utc::now();

    let grace = match QuotaRepository::new((*state.db).clone())
        .sync_grace(user_id, resource, over, now)
        .await
    {
        Ok(g) => g,
        Err(e) => return error_response(&db_error(e)),
    };

    match enforce_hard_cap(
        resource,
        projected,
        limit,
        grace,
        grace_days_for(&state.config.quota, resource),
        now,
    ) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "allowed": true,
                "resource": resource,
                "usage": projected,
                "limit": limit,
            })),
        )
            .into_response(),
        Err(e) => {
            record_audit(
                &state,
                AuditEntry {
                    actor_id: Some(auth.user_id()),
                    action: "quota.hard_cap_denied".to_string(),
                    resource: resource.to_string(),
                    severity: AuditSeverity::Warning,
                    detail: json!({ "user_id": user_id, "message": e.to_string() }),
                },
            )
            .await;

            error_response(&AppError::QuotaExceeded(e.to_string()))
        }
    }
}
