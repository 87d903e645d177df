//! Entitlement evaluation over live usage counters.

use chrono::{DateTime, Utc};

use super::error::QuotaError;
use super::types::{Entitlement, GraceState, QuotaAction, ResourceKind};

/// Projects usage for admission: an `add` is checked as if the resource
/// already existed, a `use` is checked against current usage.
#[must_use]
pub const fn projected_usage(current: i64, action: QuotaAction) -> i64 {
    match action {
        QuotaAction::Add => current + 1,
        QuotaAction::Use => current,
    }
}

/// Three-tier entitlement check.
///
/// 1. Soft cap: usage at or above `soft_cap_percent` of quota is allowed
///    with a warning.
/// 2. Grace period: usage over quota but within `grace_days` of the
///    quota-exceeded event is allowed with the days remaining.
/// 3. Hard cap: over quota with grace elapsed is a `QuotaExceeded` error.
///
/// `quota = None` means unlimited.
///
/// # Errors
///
/// Returns `QuotaError::QuotaExceeded` when the hard cap applies.
pub fn check_entitlement(
    resource: ResourceKind,
    usage: i64,
    quota: Option<i64>,
    soft_cap_percent: u8,
    grace: GraceState,
    grace_days: i64,
    now: DateTime<Utc>,
) -> Result<Entitlement, QuotaError> {
    let Some(limit) = quota else {
        return Ok(Entitlement::Allowed);
    };

    if usage > limit {
        // Grace starts at the first over-quota observation; absent state
        // means the overage is being observed right now.
        let exceeded_at = grace.exceeded_at.unwrap_or(now);
        let elapsed_days = (now - exceeded_at).num_days();
        let days_remaining = grace_days - elapsed_days;

        if days_remaining > 0 {
            return Ok(Entitlement::Grace { days_remaining });
        }
        return Err(QuotaError::QuotaExceeded {
            resource,
            usage,
            limit,
        });
    }

    if is_soft_capped(usage, limit, soft_cap_percent) {
        return Ok(Entitlement::SoftWarn {
            warning: format!("{resource} usage at {usage}/{limit}; approaching plan limit"),
        });
    }

    Ok(Entitlement::Allowed)
}

/// Raises the hard-cap domain error if (and only if) the check denies.
///
/// Callers of `add`-type actions must refuse to persist the new resource
/// when this returns an error.
///
/// # Errors
///
/// Returns `QuotaError::QuotaExceeded` identifying current usage and limit.
pub fn enforce_hard_cap(
    resource: ResourceKind,
    usage: i64,
    quota: Option<i64>,
    grace: GraceState,
    grace_days: i64,
    now: DateTime<Utc>,
) -> Result<(), QuotaError> {
    // Soft-cap threshold is irrelevant here; 100 keeps the warning tier out.
    check_entitlement(resource, usage, quota, 100, grace, grace_days, now).map(|_| ())
}

/// Integer soft-cap comparison: `usage >= limit * percent / 100`,
/// avoiding both floats and overflow.
fn is_soft_capped(usage: i64, limit: i64, percent: u8) -> bool {
    if limit <= 0 {
        return true;
    }
    i128::from(usage) * 100 >= i128::from(limit) * i128::from(percent)
}
