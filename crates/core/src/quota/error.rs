//! Quota error types.

use thiserror::Error;

use super::types::ResourceKind;

/// Quota enforcement failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuotaError {
    /// Hard cap reached: usage over limit and grace elapsed.
    #[error("Quota exceeded for {resource}: usage {usage} over limit {limit}")]
    QuotaExceeded {
        /// Resource that hit the cap.
        resource: ResourceKind,
        /// Current live usage.
        usage: i64,
        /// Effective limit.
        limit: i64,
    },

    /// The action is disallowed outright for this resource.
    #[error("Action not permitted for {resource}")]
    ActionDisallowed {
        /// Resource the action targeted.
        resource: ResourceKind,
    },
}
