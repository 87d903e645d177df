//! Payment creation and provider callback reconciliation routes.
//!
//! The return URL and the IPN are both verified against the shared
//! secret before any business field is read. The IPN always answers
//! HTTP 200 with a provider acknowledgement code; anything else makes
//! the provider retry forever.

use std::collections::BTreeMap;

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};
use vigil_core::lifecycle::DeliveryData;
use vigil_core::payment::{CallbackParams, IpnAck, verify_signature};
use vigil_db::entities::sea_orm_active_enums::PaymentStatus;
use vigil_db::repositories::{
    AuditEntry, AuditSeverity, CallbackOutcome, PaymentRepository, PlanRepository,
    plan::price_of,
};
use vigil_shared::AppError;

use crate::AppState;
use crate::middleware::AuthUser;
use crate::routes::{
    catalog_error, client_ip, error_response, idempotency_key, payment_error, payment_json,
    record_audit, require_admin,
};

/// Creates the provider-facing routes (signature-verified, no JWT).
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/payments/return",
            get(payment_return_get).post(payment_return_post),
        )
        .route("/payments/ipn", post(payment_ipn))
}

/// Creates the protected payment routes (requires auth middleware to be
/// applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/vnpay", post(create_payment))
        .route(
            "/payments/{provider_ref}",
            get(payment_status).delete(cancel_payment),
        )
}

/// Request body for creating a plan purchase payment.
#[derive(Debug, Deserialize)]
struct CreatePaymentRequest {
    /// Plan the payment unlocks on success.
    plan_code: String,
}

/// POST /payments/vnpay - Create a pending payment for a plan purchase
/// and return the hosted payment page URL.
///
/// Honors the `Idempotency-Key` header: a replay returns the originally
/// created payment.
async fn create_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentRequest>,
) -> impl IntoResponse {
    let plans = PlanRepository::new((*state.db).clone());
    let now = Utc::now();

    let plan = match plans.current_version(&payload.plan_code).await {
        Ok(p) => p,
        Err(e) => return error_response(&catalog_error(e)),
    };
    let price = match price_of(&plan) {
        Ok(p) => p,
        Err(e) => return error_response(&catalog_error(e)),
    };
    if price.is_zero() {
        return error_response(&AppError::Validation(format!(
            "plan '{}' has nothing to pay for",
            payload.plan_code
        )));
    }

    let payments = PaymentRepository::new((*state.db).clone());
    let delivery = DeliveryData::NewPlan {
        plan_code: plan.code.clone(),
    };
    let payment = match payments
        .create(
            auth.user_id(),
            price,
            &delivery,
            idempotency_key(&headers),
            now,
        )
        .await
    {
        Ok(p) => p,
        Err(e) => return error_response(&payment_error(e)),
    };

    let pay_url = match state.vnpay.redirect_url(
        &payment.provider_ref,
        price,
        &format!("Purchase plan {}", plan.code),
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
            action: "payment.create".to_string(),
            resource: "payment".to_string(),
            severity: AuditSeverity::Info,
            detail: json!({
                "provider_ref": payment.provider_ref,
                "plan_code": plan.code,
            }),
        },
    )
    .await;

    (
        StatusCode::CREATED,
        Json(json!({
            "payment": payment_json(&payment),
            "pay_url": pay_url,
        })),
    )
        .into_response()
}

/// GET /payments/return - Browser redirect back from the payment page.
async fn payment_return_get(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    handle_return(&state, &params).await
}

/// POST /payments/return - Same payload delivered as a form post.
async fn payment_return_post(
    State(state): State<AppState>,
    Form(params): Form<BTreeMap<String, String>>,
) -> Response {
    handle_return(&state, &params).await
}

/// Verifies and reconciles a return-URL payload, answering the browser
/// with a JSON outcome.
async fn handle_return(state: &AppState, params: &BTreeMap<String, String>) -> Response {
    if let Err(e) = verify_signature(params, &state.config.vnpay.hash_secret) {
        warn!(error = %e, "return callback rejected");
        return error_response(&AppError::SignatureInvalid(e.to_string()));
    }

    let callback = match CallbackParams::from_params(params) {
        Ok(c) => c,
        Err(e) => return error_response(&AppError::Validation(e.to_string())),
    };

    let payments = PaymentRepository::new((*state.db).clone());
    match payments.reconcile_callback(&callback, Utc::now()).await {
        Ok(CallbackOutcome::Applied(payment)) => (
            StatusCode::OK,
            Json(json!({
                "result": "applied",
                "payment": payment_json(&payment),
            })),
        )
            .into_response(),
        Ok(CallbackOutcome::AlreadyProcessed(payment)) => (
            StatusCode::OK,
            Json(json!({
                "result": "already_processed",
                "payment": payment_json(&payment),
            })),
        )
            .into_response(),
        Ok(CallbackOutcome::AmountMismatch(payment)) => {
            record_audit(
                state,
                AuditEntry {
                    actor_id: None,
                    action: "payment.amount_mismatch".to_string(),
                    resource: "payment".to_string(),
                    severity: AuditSeverity::Warning,
                    detail: json!({
                        "provider_ref": callback.txn_ref,
                        "expected_minor": payment.amount_minor,
                        "got_minor": callback.amount_minor,
                    }),
                },
            )
            .await;

            error_response(&AppError::AmountMismatch(format!(
                "expected {} minor units, callback carried {}",
                payment.amount_minor, callback.amount_minor
            )))
        }
        Ok(CallbackOutcome::OrderNotFound) => error_response(&AppError::NotFound(format!(
            "payment {}",
            callback.txn_ref
        ))),
        Err(e) => error_response(&payment_error(e)),
    }
}

/// POST /payments/ipn - Server-to-server instant payment notification.
///
/// Always HTTP 200; the acknowledgement code tells the provider whether
/// to stop retrying.
async fn payment_ipn(
    State(state): State<AppState>,
    Form(params): Form<BTreeMap<String, String>>,
) -> Json<IpnAck> {
    if let Err(e) = verify_signature(&params, &state.config.vnpay.hash_secret) {
        warn!(error = %e, "IPN rejected");
        return Json(IpnAck::signature_invalid());
    }

    let callback = match CallbackParams::from_params(&params) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "malformed IPN payload");
            return Json(IpnAck::internal_error());
        }
    };

    let payments = PaymentRepository::new((*state.db).clone());
    let ack = match payments.reconcile_callback(&callback, Utc::now()).await {
        Ok(CallbackOutcome::Applied(_)) => IpnAck::accepted(),
        Ok(CallbackOutcome::AlreadyProcessed(_)) => IpnAck::already_processed(),
        Ok(CallbackOutcome::AmountMismatch(_)) => IpnAck::amount_mismatch(),
        Ok(CallbackOutcome::OrderNotFound) => IpnAck::order_not_found(),
        Err(e) => {
            error!(error = %e, provider_ref = %callback.txn_ref, "IPN reconciliation failed");
            IpnAck::internal_error()
        }
    };

    Json(ack)
}

/// DELETE `/payments/{provider_ref}` - Cancel a pending payment (admin).
///
/// The compare-and-set loses against a concurrent success callback, in
/// which case the payment stays paid and this answers a conflict.
async fn cancel_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider_ref): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = require_admin(&auth) {
        return resp;
    }

    let payments = PaymentRepository::new((*state.db).clone());

    let payment = match payments.find_by_provider_ref(&provider_ref).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return error_response(&AppError::NotFound(format!("payment {provider_ref}")));
        }
        Err(e) => return error_response(&payment_error(e)),
    };

    let cancelled = match payments
        .mark_terminal(payment.id, PaymentStatus::Cancelled)
        .await
    {
        Ok(p) => p,
        Err(e) => return error_response(&payment_error(e)),
    };

    record_audit(
        &state,
        AuditEntry {
            actor_id: Some(auth.user_id()),
            action: "payment.cancel".to_string(),
            resource: "payment".to_string(),
            severity: AuditSeverity::Warning,
            detail: json!({ "provider_ref": provider_ref }),
        },
    )
    .await;

    (
        StatusCode::OK,
        Json(json!({ "payment": payment_json(&cancelled) })),
    )
        .into_response()
}

/// GET `/payments/{provider_ref}` - Payment status, actively reconciling
/// stale pending payments against the provider.
///
/// A provider timeout answers 502 and leaves the payment pending; the
/// next status read retries.
async fn payment_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider_ref): Path<String>,
) -> impl IntoResponse {
    let payments = PaymentRepository::new((*state.db).clone());
    let now = Utc::now();

    let payment = match payments.find_by_provider_ref(&provider_ref).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return error_response(&AppError::NotFound(format!("payment {provider_ref}")));
        }
        Err(e) => return error_response(&payment_error(e)),
    };

    if payment.user_id != auth.user_id() && !auth.is_admin() {
        return error_response(&AppError::Forbidden(
            "payment belongs to another user".to_string(),
        ));
    }

    let stale = payment.status.is_pending()
        && payment.created_at.with_timezone(&Utc) + state.vnpay.reconcile_after() <= now;

    let payment = if stale {
        match state
            .vnpay
            .query_transaction(&provider_ref, payment.created_at.with_timezone(&Utc), now)
            .await
        {
            Ok(Some(status_code)) => {
                match payments
                    .resolve_from_provider(&provider_ref, &status_code, now)
                    .await
                {
                    Ok(p) => p,
                    Err(e) => return error_response(&payment_error(e)),
                }
            }
            // Provider answered but does not know the transaction yet
            Ok(None) => payment,
            Err(e) => return error_response(&e),
        }
    } else {
        payment
    };

    (
        StatusCode::OK,
        Json(json!({ "payment": payment_json(&payment) })),
    )
        .into_response()
}
