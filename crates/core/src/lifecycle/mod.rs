//! Subscription state machine rules and payment delivery payloads.

pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::LifecycleError;
pub use types::{
    BillingPeriod, BillingType, DeliveryData, SubscriptionStatus, period_end_after,
    require_downgrade, require_upgrade,
};
