//! Plan catalog and subscription lifecycle routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;
use vigil_core::lifecycle::{BillingPeriod, BillingType};
use vigil_core::plan::{PlanQuotas, VersionState};
use vigil_core::quota::{EffectiveQuotas, OverridePolicy, QuotaOverrides};
use vigil_db::entities::{
    plan_versions,
    sea_orm_active_enums::{BillingPeriod as DbBillingPeriod, SubscriptionStatus},
    subscriptions,
};
use vigil_db::repositories::{
    AuditEntry, AuditSeverity, CatalogError, CreateVersionInput, PlanRepository, QuotaRepository,
    SubscriptionError, SubscriptionRepository, UpgradeDecision, UsageRepository,
    plan::{quotas_of, snapshot},
};
use vigil_shared::{AppError, Currency, Money};

use crate::middleware::AuthUser;
use crate::routes::{
    catalog_error, client_ip, db_error, error_response, idempotency_key, payment_json,
    record_audit, require_admin, subscription_error,
};
use crate::AppState;

/// Admin-override write policy for `PUT /plans/quota`. The endpoint
/// acknowledges without persisting until the grant flow is productized;
/// actual grants go through the seeder and internal tooling.
const OVERRIDE_POLICY: OverridePolicy = OverridePolicy::Disabled;

/// Creates routes that are readable without authentication.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/plans/{code}", get(get_plan))
}

/// Creates the protected plan and subscription routes (requires auth
/// middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/plans/current", get(current_subscription))
        .route("/plans/upgrade", put(upgrade_plan))
        .route("/plans/downgrade", put(downgrade_plan))
        .route(
            "/plans/renew",
            put(request_renewal).get(get_renewal).delete(cancel_renewal),
        )
        .route("/plans/cancel", delete(cancel_subscription))
        .route("/plans/quota", put(override_quota))
        .route("/plans/versions", post(create_version))
        .route("/plans/versions/{id}/activate", post(activate_version))
        .route("/plans/versions/{id}/deprecate", post(deprecate_version))
        .route("/plans/versions/{id}/archive", post(archive_version))
        .route("/plans/versions/{id}", delete(delete_version))
}

/// Stable wire string for a subscription status.
const fn subscription_status_str(status: &SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Trialing => "trialing",
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Paused => "paused",
        SubscriptionStatus::PastDue => "past_due",
        SubscriptionStatus::Cancelled => "cancelled",
    }
}

/// Standard JSON shape for a subscription.
fn subscription_json(sub: &subscriptions::Model) -> Value {
    json!({
        "id": sub.id,
        "user_id": sub.user_id,
        "plan_code": sub.plan_code,
        "plan_version_id": sub.plan_version_id,
        "status": subscription_status_str(&sub.status),
        "current_period_start": sub.current_period_start,
        "current_period_end": sub.current_period_end,
        "billing_period": BillingPeriod::from(sub.billing_period.clone()),
        "billing_type": BillingType::from(sub.billing_type.clone()),
        "auto_renew": sub.auto_renew,
        "last_payment_at": sub.last_payment_at,
        "pending_downgrade_code": sub.pending_downgrade_code,
        "pending_downgrade_at": sub.pending_downgrade_at,
    })
}

/// Standard JSON shape for a plan version.
fn plan_json(model: &plan_versions::Model) -> Result<Value, CatalogError> {
    let snap = snapshot(model)?;

    Ok(json!({
        "id": snap.version_id,
        "code": snap.code,
        "version": snap.version,
        "tier": snap.tier,
        "price_minor": snap.price.amount_minor,
        "currency": snap.price.currency,
        "billing_period": snap.billing_period,
        "quotas": snap.quotas,
        "state": VersionState::from(model.state.clone()),
        "effective_from": model.effective_from,
        "effective_to": model.effective_to,
    }))
}

/// GET /plans - List the current version of every plan open to sign-ups.
async fn list_plans(State(state): State<AppState>) -> impl IntoResponse {
    let repo = PlanRepository::new((*state.db).clone());

    let versions = match repo.list_current().await {
        Ok(v) => v,
        Err(e) => return error_response(&catalog_error(e)),
    };

    let mut plans = Vec::with_capacity(versions.len());
    for version in &versions {
        match plan_json(version) {
            Ok(j) => plans.push(j),
            Err(e) => return error_response(&catalog_error(e)),
        }
    }

    (StatusCode::OK, Json(json!({ "plans": plans }))).into_response()
}

/// GET `/plans/{code}` - Get the current version of one plan.
async fn get_plan(State(state): State<AppState>, Path(code): Path<String>) -> impl IntoResponse {
    let repo = PlanRepository::new((*state.db).clone());

    let version = match repo.current_version(&code).await {
        Ok(v) => v,
        Err(e) => return error_response(&catalog_error(e)),
    };

    match plan_json(&version) {
        Ok(j) => (StatusCode::OK, Json(j)).into_response(),
        Err(e) => error_response(&catalog_error(e)),
    }
}

/// GET /plans/current - The caller's subscription with effective quotas
/// and live usage.
///
/// Reading is a lifecycle touch: due scheduled downgrades are applied
/// and lapsed periods marked `past_due` before the response is built.
/// First touch provisions the free-tier subscription.
async fn current_subscription(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    let subs = SubscriptionRepository::new((*state.db).clone());
    let now = Utc::now();

    let sub = match subs.refresh(auth.user_id(), now).await {
        Ok(s) => s,
        Err(SubscriptionError::NotFound(_)) => {
            match subs.create_free(auth.user_id(), now).await {
                Ok(s) => s,
                Err(e) => return error_response(&subscription_error(e)),
            }
        }
        Err(e) => return error_response(&subscription_error(e)),
    };

    let plans = PlanRepository::new((*state.db).clone());
    let plan = match plans.find_by_id(sub.plan_version_id).await {
        Ok(p) => p,
        Err(e) => return error_response(&catalog_error(e)),
    };
    let plan_body = match plan_json(&plan) {
        Ok(j) => j,
        Err(e) => return error_response(&catalog_error(e)),
    };

    let overrides = match QuotaRepository::new((*state.db).clone())
        .get_overrides(sub.user_id)
        .await
    {
        Ok(o) => o,
        Err(e) => return error_response(&db_error(e)),
    };
    let usage = match UsageRepository::new((*state.db).clone())
        .counters(sub.user_id)
        .await
    {
        Ok(u) => u,
        Err(e) => return error_response(&db_error(e)),
    };

    let quotas = EffectiveQuotas::resolve(
        overrides.as_ref(),
        Some(&quotas_of(&plan)),
        &state.config.quota,
    );

    (
        StatusCode::OK,
        Json(json!({
            "subscription": subscription_json(&sub),
            "plan": plan_body,
            "effective_quotas": quotas,
            "usage": usage,
        })),
    )
        .into_response()
}

/// Request body for an upgrade.
#[derive(Debug, Deserialize)]
struct UpgradeRequest {
    /// Target plan code; must be a strictly higher tier.
    plan_code: String,
}

/// PUT /plans/upgrade - Prorated upgrade to a higher tier.
///
/// Honors the `Idempotency-Key` header: a replay returns the recorded
/// decision, a key reuse with a different target is rejected.
async fn upgrade_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<UpgradeRequest>,
) -> impl IntoResponse {
    let subs = SubscriptionRepository::new((*state.db).clone());
    let now = Utc::now();

    let decision = match subs
        .prepare_upgrade(
            auth.user_id(),
            &payload.plan_code,
            idempotency_key(&headers),
            now,
        )
        .await
    {
        Ok(d) => d,
        Err(e) => return error_response(&subscription_error(e)),
    };

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "plan.upgrade".to_string(),
            resource: "subscription".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({ "plan_code": payload.plan_code }),
        },
    )
    .await;

    match decision {
        UpgradeDecision::Applied { subscription } => (
            StatusCode::OK,
            Json(json!({
                "result": "applied",
                "subscription": subscription_json(&subscription),
            })),
        )
            .into_response(),
        UpgradeDecision::PaymentRequired {
            payment,
            credit_minor,
            charge_minor,
            net_due_minor,
        } => {
            let Ok(currency) = payment.currency.parse::<Currency>() else {
                return error_response(&AppError::Internal("corrupt payment record".to_string()));
            };
            let pay_url = match state.vnpay.redirect_url(
                &payment.provider_ref,
                Money::new(payment.amount_minor, currency),
                &format!("Upgrade to {}", payload.plan_code),
                &client_ip(&headers),
                now,
            ) {
                Ok(u) => u,
                Err(e) => return error_response(&e),
            };

            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "result": "payment_required",
                    "payment": payment_json(&payment),
                    "credit_minor": credit_minor,
                    "charge_minor": charge_minor,
                    "net_due_minor": net_due_minor,
                    "pay_url": pay_url,
                })),
            )
                .into_response()
        }
    }
}

/// Request body for a downgrade.
#[derive(Debug, Deserialize)]
struct DowngradeRequest {
    /// Target plan code; must be a strictly lower tier.
    plan_code: String,
    /// Optional explicit effective time; defaults to the period end.
    effective_at: Option<DateTime<Utc>>,
}

/// PUT /plans/downgrade - Schedule a downgrade for the period end.
///
/// Never mutates the plan mid-period; the swap happens on a later
/// lifecycle touch once the effective time passes.
async fn downgrade_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<DowngradeRequest>,
) -> impl IntoResponse {
    let subs = SubscriptionRepository::new((*state.db).clone());

    let sub = match subs
        .schedule_downgrade(auth.user_id(), &payload.plan_code, payload.effective_at)
        .await
    {
        Ok(s) => s,
        Err(e) => return error_response(&subscription_error(e)),
    };

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "plan.downgrade".to_string(),
            resource: "subscription".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({
                "plan_code": payload.plan_code,
                "effective_at": sub.pending_downgrade_at,
            }),
        },
    )
    .await;

    (
        StatusCode::OK,
        Json(json!({
            "result": "scheduled",
            "subscription": subscription_json(&sub),
        })),
    )
        .into_response()
}

/// Request body for a manual renewal.
#[derive(Debug, Default, Deserialize)]
struct RenewRequest {
    /// Billing period for the renewed interval; defaults to the current one.
    billing_period: Option<BillingPeriod>,
    /// Billing type for the renewed interval; defaults to the current one.
    billing_type: Option<BillingType>,
}

/// PUT /plans/renew - Request a manual renewal payment.
///
/// At most one pending manual-renewal payment exists per subscription;
/// a repeat request returns the existing one with a fresh pay URL.
async fn request_renewal(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    payload: Option<Json<RenewRequest>>,
) -> impl IntoResponse {
    let subs = SubscriptionRepository::new((*state.db).clone());
    let now = Utc::now();
    let Json(payload) = payload.unwrap_or_default();

    let payment = match subs
        .request_manual_renewal(
            auth.user_id(),
            payload.billing_period,
            payload.billing_type,
            now,
        )
        .await
    {
        Ok(p) => p,
        Err(e) => return error_response(&subscription_error(e)),
    };

    let Ok(currency) = payment.currency.parse::<Currency>() else {
        return error_response(&AppError::Internal("corrupt payment record".to_string()));
    };
    let pay_url = match state.vnpay.redirect_url(
        &payment.provider_ref,
        Money::new(payment.amount_minor, currency),
        "Subscription renewal",
        &client_ip(&headers),
        now,
    ) {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "plan.renew".to_string(),
            resource: "payment".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({ "provider_ref": payment.provider_ref }),
        },
    )
    .await;

    (
        StatusCode::OK,
        Json(json!({
            "payment": payment_json(&payment),
            "pay_url": pay_url,
        })),
    )
        .into_response()
}

/// GET /plans/renew - The pending manual-renewal payment, if any.
async fn get_renewal(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    let subs = SubscriptionRepository::new((*state.db).clone());

    match subs.find_pending_renewal(auth.user_id()).await {
        Ok(Some(payment)) => (
            StatusCode::OK,
            Json(json!({ "payment": payment_json(&payment) })),
        )
            .into_response(),
        Ok(None) => error_response(&AppError::NotFound(
            "no pending manual-renewal payment".to_string(),
        )),
        Err(e) => error_response(&subscription_error(e)),
    }
}

/// DELETE /plans/renew - Cancel the pending manual-renewal payment.
async fn cancel_renewal(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    let subs = SubscriptionRepository::new((*state.db).clone());

    let payment = match subs.cancel_pending_manual_renewal(auth.user_id()).await {
        Ok(p) => p,
        Err(e) => return error_response(&subscription_error(e)),
    };

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "plan.renew.cancel".to_string(),
            resource: "payment".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({ "provider_ref": payment.provider_ref }),
        },
    )
    .await;

    (
        StatusCode::OK,
        Json(json!({ "payment": payment_json(&payment) })),
    )
        .into_response()
}

/// DELETE /plans/cancel - Cancel the subscription. Terminal.
async fn cancel_subscription(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    let subs = SubscriptionRepository::new((*state.db).clone());

    let sub = match subs.cancel(auth.user_id()).await {
        Ok(s) => s,
        Err(e) => return error_response(&subscription_error(e)),
    };

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "subscription.cancel".to_string(),
            resource: "subscription".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({ "subscription_id": sub.id }),
        },
    )
    .await;

    (
        StatusCode::OK,
        Json(json!({ "subscription": subscription_json(&sub) })),
    )
        .into_response()
}

/// Request body for an admin quota override.
#[derive(Debug, Deserialize)]
struct QuotaOverrideRequest {
    /// User receiving the override.
    user_id: Uuid,
    /// Override fields; `None` defers to the plan.
    #[serde(flatten)]
    overrides: QuotaOverrides,
}

/// PUT /plans/quota - Admin quota override endpoint.
///
/// Acknowledges without writing while [`OVERRIDE_POLICY`] is disabled;
/// the response names the policy so clients can branch on it.
async fn override_quota(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<QuotaOverrideRequest>,
) -> impl IntoResponse {
    if let Err(resp) = require_admin(&auth) {
        return resp;
    }

    if OVERRIDE_POLICY.is_enabled() {
        let repo = QuotaRepository::new((*state.db).clone());
        if let Err(e) = repo
            .grant_overrides(payload.user_id, payload.overrides, auth.user_id())
            .await
        {
            return error_response(&db_error(e));
        }
    }

    info!(
        user_id = %payload.user_id,
        granted_by = %auth.user_id(),
        applied = OVERRIDE_POLICY.is_enabled(),
        "quota override request"
    );

    (
        StatusCode::OK,
        Json(json!({
            "policy": OVERRIDE_POLICY,
            "applied": OVERRIDE_POLICY.is_enabled(),
            "user_id": payload.user_id,
        })),
    )
        .into_response()
}

/// Request body for publishing a plan version.
#[derive(Debug, Deserialize)]
struct CreatePlanVersionRequest {
    code: String,
    version: String,
    tier: i32,
    price_minor: i64,
    currency: Currency,
    billing_period: BillingPeriod,
    quotas: PlanQuotas,
    effective_from: DateTime<Utc>,
    effective_to: Option<DateTime<Utc>>,
}

/// POST /plans/versions - Publish a new draft plan version (admin).
async fn create_version(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreatePlanVersionRequest>,
) -> impl IntoResponse {
    if let Err(resp) = require_admin(&auth) {
        return resp;
    }

    let repo = PlanRepository::new((*state.db).clone());
    let version = match repo
        .create_version(CreateVersionInput {
            code: payload.code,
            version: payload.version,
            tier: payload.tier,
            price: Money::new(payload.price_minor, payload.currency),
            billing_period: DbBillingPeriod::from(payload.billing_period),
            quotas: payload.quotas,
            effective_from: payload.effective_from,
            effective_to: payload.effective_to,
        })
        .await
    {
        Ok(v) => v,
        Err(e) => return error_response(&catalog_error(e)),
    };

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "plan.version.create".to_string(),
            resource: "plan_version".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({ "code": version.code, "version": version.version }),
        },
    )
    .await;

    match plan_json(&version) {
        Ok(j) => (StatusCode::CREATED, Json(j)).into_response(),
        Err(e) => error_response(&catalog_error(e)),
    }
}

/// POST `/plans/versions/{id}/activate` - Make a version the single
/// current one for its code (admin).
async fn activate_version(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(resp) = require_admin(&auth) {
        return resp;
    }

    let repo = PlanRepository::new((*state.db).clone());
    match repo.activate_version(id).await {
        Ok(version) => version_transition_response(&state, &auth, "plan.version.activate", &version).await,
        Err(e) => error_response(&catalog_error(e)),
    }
}

/// POST `/plans/versions/{id}/deprecate` - Hide a version from new
/// sign-ups (admin).
async fn deprecate_version(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(resp) = require_admin(&auth) {
        return resp;
    }

    let repo = PlanRepository::new((*state.db).clone());
    match repo.deprecate_version(id).await {
        Ok(version) => version_transition_response(&state, &auth, "plan.version.deprecate", &version).await,
        Err(e) => error_response(&catalog_error(e)),
    }
}

/// Request body for archiving a version.
#[derive(Debug, Deserialize)]
struct ArchiveVersionRequest {
    /// Plan existing subscribers migrate to at their next renewal.
    successor_code: String,
}

/// POST `/plans/versions/{id}/archive` - Archive a version with a
/// successor (admin).
async fn archive_version(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ArchiveVersionRequest>,
) -> impl IntoResponse {
    if let Err(resp) = require_admin(&auth) {
        return resp;
    }

    let repo = PlanRepository::new((*state.db).clone());
    match repo.archive_version(id, &payload.successor_code).await {
        Ok(version) => version_transition_response(&state, &auth, "plan.version.archive", &version).await,
        Err(e) => error_response(&catalog_error(e)),
    }
}

/// DELETE `/plans/versions/{id}` - Hard-delete an unreferenced version
/// (admin).
async fn delete_version(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(resp) = require_admin(&auth) {
        return resp;
    }

    let repo = PlanRepository::new((*state.db).clone());
    if let Err(e) = repo.delete_version(id).await {
        return error_response(&catalog_error(e));
    }

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "plan.version.delete".to_string(),
            resource: "plan_version".to_string(),
            severity: AuditSeverity::Warning,
            detail: json!({ "version_id": id }),
        },
    )
    .await;

    StatusCode::NO_CONTENT.into_response()
}

/// Shared response path for version state transitions.
async fn version_transition_response(
    state: &AppState,
    auth: &AuthUser,
    action: &str,
    version: &plan_versions::Model,
) -> Response {
    record_audit(
        state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: action.to_string(),
            resource: "plan_version".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({ "code": version.code, "version": version.version }),
        },
    )
    .await;

    match plan_json(version) {
        Ok(j) => (StatusCode::OK, Json(j)).into_response(),
        Err(e) => error_response(&catalog_error(e)),
    }
}
