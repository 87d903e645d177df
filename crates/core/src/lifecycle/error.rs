//! Subscription lifecycle error types.

use thiserror::Error;

use super::types::SubscriptionStatus;

/// Subscription state machine violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Disallowed status transition.
    #[error("Invalid subscription transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: SubscriptionStatus,
        /// Requested status.
        to: SubscriptionStatus,
    },

    /// Upgrade requested to an equal or lower tier.
    #[error("Target tier {target_tier} is not above current tier {current_tier}")]
    NotAnUpgrade {
        /// Tier of the current plan.
        current_tier: i32,
        /// Tier of the requested plan.
        target_tier: i32,
    },

    /// Downgrade requested to an equal or higher tier.
    #[error("Target tier {target_tier} is not below current tier {current_tier}")]
    NotADowngrade {
        /// Tier of the current plan.
        current_tier: i32,
        /// Tier of the requested plan.
        target_tier: i32,
    },
}
