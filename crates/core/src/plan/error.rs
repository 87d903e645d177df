//! Plan catalog error types.

use thiserror::Error;

use super::types::VersionState;

/// Plan catalog rule violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Version lifecycle does not allow this transition.
    #[error("Invalid plan version state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current state.
        from: VersionState,
        /// Requested state.
        to: VersionState,
    },

    /// Published versions are immutable.
    #[error("Plan version is published and cannot be edited")]
    VersionImmutable,
}
