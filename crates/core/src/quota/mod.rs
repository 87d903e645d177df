//! Quota & entitlement evaluation: soft cap, grace period, hard cap.

pub mod error;
pub mod evaluator;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::QuotaError;
pub use evaluator::{check_entitlement, enforce_hard_cap, projected_usage};
pub use types::{
    EffectiveQuotas, Entitlement, GraceState, OverridePolicy, QuotaAction, QuotaOverrides,
    ResourceKind, UsageCounters,
};
