//! Plan catalog rules: version lifecycle and tier comparison.

pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::PlanError;
pub use types::{PlanQuotas, PlanSnapshot, TierOrdering, VersionState, compare_tier};
