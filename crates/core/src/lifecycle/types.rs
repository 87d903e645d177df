//! Subscription lifecycle types.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use super::error::LifecycleError;
use crate::plan::{TierOrdering, compare_tier};

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In a free trial window.
    Trialing,
    /// Paid-up (or free-tier) and entitled.
    Active,
    /// Temporarily suspended by the customer or an admin.
    Paused,
    /// Period lapsed without payment; entitlements restricted.
    PastDue,
    /// Terminal; a new subscription must be created to come back.
    Cancelled,
}

impl SubscriptionStatus {
    /// Validates a status transition.
    ///
    /// `active → active` is permitted: upgrades and renewals loop back to
    /// `active` with new plan/period fields.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidTransition` for a disallowed edge.
    pub fn transition_to(self, target: Self) -> Result<Self, LifecycleError> {
        let allowed = matches!(
            (self, target),
            (Self::Trialing, Self::Active | Self::PastDue | Self::Cancelled)
                | (
                    Self::Active,
                    Self::Active | Self::Paused | Self::PastDue | Self::Cancelled
                )
                | (Self::Paused, Self::Active | Self::Cancelled)
                | (Self::PastDue, Self::Active | Self::Cancelled)
        );

        if allowed {
            Ok(target)
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Whether the subscription still counts as "live" (blocks creating
    /// another one for the same user).
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trialing => write!(f, "trialing"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::PastDue => write!(f, "past_due"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Billing period of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    /// Renews every calendar month.
    Monthly,
    /// No recurring billing (free tier).
    None,
}

/// Billing type of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    /// Paid at period start.
    Prepaid,
    /// Paid at period end.
    Postpaid,
}

/// Computes the period end for a period starting at `start`.
///
/// Non-billing (free) subscriptions get a far-future horizon so the
/// "active implies period end in the future" invariant holds without a
/// nullable column.
#[must_use]
pub fn period_end_after(start: DateTime<Utc>, period: BillingPeriod) -> DateTime<Utc> {
    let months = match period {
        BillingPeriod::Monthly => Months::new(1),
        BillingPeriod::None => Months::new(1200),
    };
    start
        .checked_add_months(months)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Asserts that a plan change is a strict upgrade.
///
/// # Errors
///
/// Returns `LifecycleError::NotAnUpgrade` when the target tier is equal
/// or lower, regardless of price.
pub fn require_upgrade(current_tier: i32, target_tier: i32) -> Result<(), LifecycleError> {
    match compare_tier(target_tier, current_tier) {
        TierOrdering::Higher => Ok(()),
        TierOrdering::Lower | TierOrdering::Equal => Err(LifecycleError::NotAnUpgrade {
            current_tier,
            target_tier,
        }),
    }
}

/// Asserts that a plan change is a strict downgrade.
///
/// # Errors
///
/// Returns `LifecycleError::NotADowngrade` when the target tier is equal
/// or higher.
pub fn require_downgrade(current_tier: i32, target_tier: i32) -> Result<(), LifecycleError> {
    match compare_tier(target_tier, current_tier) {
        TierOrdering::Lower => Ok(()),
        TierOrdering::Higher | TierOrdering::Equal => Err(LifecycleError::NotADowngrade {
            current_tier,
            target_tier,
        }),
    }
}

/// What a successful payment unlocks.
///
/// This is the single canonical shape persisted in `payments.delivery_data`;
/// any legacy/external payload differences are mapped at the serialization
/// boundary, never inside business logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryData {
    /// Activate a new plan (upgrade paid mid-period keeps period bounds).
    NewPlan {
        /// Target plan code.
        plan_code: String,
    },
    /// Extend the current period by one billing interval.
    Renewal {
        /// Billing period for the renewed interval.
        billing_period: BillingPeriod,
        /// Billing type for the renewed interval.
        billing_type: BillingType,
    },
    /// Confirm a scheduled downgrade taking effect at renewal.
    DowngradeAtRenewal {
        /// Target plan code.
        plan_code: String,
    },
}
