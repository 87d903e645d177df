//! Plan catalog value types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_shared::Money;

use super::error::PlanError;
use crate::lifecycle::BillingPeriod;

/// Lifecycle state of a plan version.
///
/// A version is immutable once it leaves `Draft`; price and quota edits
/// require publishing a new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    /// Editable, invisible to subscribers.
    Draft,
    /// Published; may be the current version for sign-ups.
    Active,
    /// Hidden from new sign-ups; existing subscribers unaffected.
    Deprecated,
    /// Existing subscribers migrate to the successor plan at next renewal.
    Archived,
}

impl VersionState {
    /// Validates a state transition.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::InvalidStateTransition` for anything other than
    /// draft→active, active→deprecated/archived, deprecated→archived.
    pub fn transition_to(self, target: Self) -> Result<Self, PlanError> {
        let allowed = matches!(
            (self, target),
            (Self::Draft, Self::Active)
                | (Self::Active, Self::Deprecated | Self::Archived)
                | (Self::Deprecated, Self::Archived)
        );

        if allowed {
            Ok(target)
        } else {
            Err(PlanError::InvalidStateTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Whether a version in this state may be offered to new sign-ups.
    #[must_use]
    pub const fn visible_to_signups(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for VersionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Deprecated => write!(f, "deprecated"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Quota limits carried by a plan version. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanQuotas {
    /// Maximum cameras.
    pub camera_quota: Option<i64>,
    /// Activity retention window in days.
    pub retention_days: i64,
    /// Maximum caregiver seats.
    pub caregiver_seats: Option<i64>,
    /// Maximum monitored sites.
    pub sites: Option<i64>,
}

/// An immutable snapshot of the plan version a subscription is bound to.
///
/// Snapshotted at period start so later catalog edits never retroactively
/// change an already-paid period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Plan version row ID.
    pub version_id: Uuid,
    /// Human-readable plan code (e.g. "premium").
    pub code: String,
    /// Version label within the plan.
    pub version: String,
    /// Tier used for upgrade/downgrade comparison.
    pub tier: i32,
    /// Price per billing period in minor units.
    pub price: Money,
    /// Billing period.
    pub billing_period: BillingPeriod,
    /// Quota limits.
    pub quotas: PlanQuotas,
}

/// Result of comparing two plan tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOrdering {
    /// First plan sits above the second.
    Higher,
    /// First plan sits below the second.
    Lower,
    /// Same tier.
    Equal,
}

/// Compares two plans by configured tier integer, never by price.
///
/// A plan can be cheaper but carry a higher tier (e.g. a promotional
/// plan), so upgrade/downgrade decisions must ignore price entirely.
#[must_use]
pub const fn compare_tier(tier_a: i32, tier_b: i32) -> TierOrdering {
    if tier_a > tier_b {
        TierOrdering::Higher
    } else if tier_a < tier_b {
        TierOrdering::Lower
    } else {
        TierOrdering::Equal
    }
}
