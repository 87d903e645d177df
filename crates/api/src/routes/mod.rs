//! API route definitions.

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;
use vigil_db::entities::sea_orm_active_enums::PaymentStatus;
use vigil_db::repositories::{
    AuditEntry, AuditRepository, CatalogError, PaymentError, SubscriptionError,
};
use vigil_shared::AppError;

use crate::middleware::AuthUser;
use crate::{AppState, middleware::auth::auth_middleware};

pub mod health;
pub mod payments;
pub mod plans;
pub mod quota;

/// Creates the API router with protected routes that need state for middleware.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    // Protected routes that require authentication
    let protected_routes = Router::new()
        .merge(plans::routes())
        .merge(payments::routes())
        .merge(quota::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Combine public and protected routes
    Router::new()
        .merge(health::routes())
        .merge(plans::public_routes())
        .merge(payments::public_routes())
        .merge(protected_routes)
}

/// Renders an application error as the standard error body.
pub(crate) fn error_response(err: &AppError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (
        status,
        Json(json!({ "error": err.error_code(), "message": err.to_string() })),
    )
        .into_response()
}

/// Maps a database error, logging the detail and hiding it from clients.
pub(crate) fn db_error(e: sea_orm::DbErr) -> AppError {
    error!(error = %e, "Database error");
    AppError::Database("An error occurred".to_string())
}

/// Maps catalog repository errors onto API errors.
pub(crate) fn catalog_error(e: CatalogError) -> AppError {
    match e {
        CatalogError::PlanNotFound(code) => AppError::NotFound(format!("plan '{code}'")),
        CatalogError::VersionNotFound(id) => AppError::NotFound(format!("plan version {id}")),
        CatalogError::OverlappingRange(code) => AppError::Conflict(format!(
            "effective range overlaps an existing version of plan '{code}'"
        )),
        CatalogError::Referenced(count) => AppError::Conflict(format!(
            "plan version is referenced by {count} subscriptions"
        )),
        CatalogError::State(e) => AppError::InvalidTransition(e.to_string()),
        CatalogError::Currency(code) => {
            error!(currency = %code, "Unknown currency in plan catalog");
            AppError::Internal("corrupt catalog record".to_string())
        }
        CatalogError::Database(e) => db_error(e),
    }
}

/// Maps subscription repository errors onto API errors.
pub(crate) fn subscription_error(e: SubscriptionError) -> AppError {
    match e {
        SubscriptionError::NotFound(user_id) => {
            AppError::NotFound(format!("no live subscription for user {user_id}"))
        }
        SubscriptionError::PlanNotFound(code) => AppError::NotFound(format!("plan '{code}'")),
        SubscriptionError::Lifecycle(e) => AppError::InvalidTransition(e.to_string()),
        SubscriptionError::NotRenewable => {
            AppError::Validation("subscription has no billable renewal".to_string())
        }
        SubscriptionError::PaymentNotFound => {
            AppError::NotFound("no pending manual-renewal payment".to_string())
        }
        SubscriptionError::PaymentNotPending => {
            AppError::Conflict("payment is no longer pending".to_string())
        }
        SubscriptionError::IdempotencyConflict => AppError::IdempotencyConflict(
            "idempotency key reused with a different request".to_string(),
        ),
        SubscriptionError::DeliveryData(e) => {
            error!(error = %e, "Corrupt delivery data");
            AppError::Internal("corrupt payment record".to_string())
        }
        SubscriptionError::Currency(code) => {
            error!(currency = %code, "Unknown currency on record");
            AppError::Internal("corrupt subscription record".to_string())
        }
        SubscriptionError::Database(e) => db_error(e),
    }
}

/// Maps payment repository errors onto API errors.
pub(crate) fn payment_error(e: PaymentError) -> AppError {
    match e {
        PaymentError::NotFound(what) => AppError::NotFound(format!("payment {what}")),
        PaymentError::AlreadyTerminal => {
            AppError::Conflict("payment is no longer pending".to_string())
        }
        PaymentError::IdempotencyConflict => AppError::IdempotencyConflict(
            "idempotency key reused with a different request".to_string(),
        ),
        PaymentError::DeliveryData(e) => {
            error!(error = %e, "Corrupt delivery data");
            AppError::Internal("corrupt payment record".to_string())
        }
        PaymentError::Subscription(e) => subscription_error(e),
        PaymentError::Database(e) => db_error(e),
    }
}

/// Rejects non-admin principals with the standard forbidden body.
pub(crate) fn require_admin(auth: &AuthUser) -> Result<(), Response> {
    if auth.is_admin() {
        Ok(())
    } else {
        Err(error_response(&AppError::Forbidden(
            "admin role required".to_string(),
        )))
    }
}

/// Reads the caller-supplied idempotency key, if any.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("Idempotency-Key").and_then(|v| v.to_str().ok())
}

/// Best-effort client IP for the provider redirect, from the usual proxy
/// header.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or_else(|| "127.0.0.1".to_string(), |ip| ip.trim().to_string())
}

/// Writes an audit record; failures are logged, never fatal to the request.
pub(crate) async fn record_audit(state: &AppState, entry: AuditEntry) {
    let repo = AuditRepository::new((*state.db).clone());
    if let Err(e) = repo.record(entry).await {
        error!(error = %e, "Failed to write audit record");
    }
}

/// Stable wire string for a payment status.
pub(crate) const fn payment_status_str(status: &PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Paid => "paid",
        PaymentStatus::Failed => "failed",
        PaymentStatus::Cancelled => "cancelled",
        PaymentStatus::Refunded => "refunded",
    }
}

/// Standard JSON shape for a payment.
pub(crate) fn payment_json(payment: &vigil_db::entities::payments::Model) -> serde_json::Value {
    json!({
        "id": payment.id,
        "user_id": payment.user_id,
        "amount_minor": payment.amount_minor,
        "currency": payment.currency,
        "provider": payment.provider,
        "provider_ref": payment.provider_ref,
        "status": payment_status_str(&payment.status),
        "provider_response_code": payment.provider_response_code,
        "paid_at": payment.paid_at,
        "created_at": payment.created_at,
    })
}
