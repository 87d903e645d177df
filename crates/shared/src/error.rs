//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
///
/// Every variant maps to a machine-stable error code so API clients can
/// branch on `error_code()` rather than message text.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Access denied.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Subscription state machine rejected the requested transition.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A hard quota cap was exceeded.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Payment provider callback signature did not verify.
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// Callback amount did not match the recorded payment amount.
    #[error("Amount mismatch: {0}")]
    AmountMismatch(String),

    /// Idempotency key reused with a different request fingerprint.
    #[error("Idempotency conflict: {0}")]
    IdempotencyConflict(String),

    /// Payment provider timed out or returned a server error.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Conflict (e.g., duplicate entry).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Validation(_) | Self::AmountMismatch(_) | Self::SignatureInvalid(_) => 400,
            Self::InvalidTransition(_) | Self::QuotaExceeded(_) => 422,
            Self::IdempotencyConflict(_) | Self::Conflict(_) => 409,
            Self::ProviderUnavailable(_) => 502,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            Self::SignatureInvalid(_) => "SIGNATURE_INVALID",
            Self::AmountMismatch(_) => "AMOUNT_MISMATCH",
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AppError::Unauthorized(String::new()).status_code(), 401);
        assert_eq!(AppError::Forbidden(String::new()).status_code(), 403);
        assert_eq!(AppError::NotFound(String::new()).status_code(), 404);
        assert_eq!(AppError::Validation(String::new()).status_code(), 400);
        assert_eq!(AppError::InvalidTransition(String::new()).status_code(), 422);
        assert_eq!(AppError::QuotaExceeded(String::new()).status_code(), 422);
        assert_eq!(AppError::SignatureInvalid(String::new()).status_code(), 400);
        assert_eq!(AppError::AmountMismatch(String::new()).status_code(), 400);
        assert_eq!(
            AppError::IdempotencyConflict(String::new()).status_code(),
            409
        );
        assert_eq!(
            AppError::ProviderUnavailable(String::new()).status_code(),
            502
        );
        assert_eq!(AppError::Conflict(String::new()).status_code(), 409);
        assert_eq!(AppError::Database(String::new()).status_code(), 500);
        assert_eq!(AppError::Internal(String::new()).status_code(), 500);
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(AppError::NotFound(String::new()).error_code(), "NOT_FOUND");
        assert_eq!(
            AppError::InvalidTransition(String::new()).error_code(),
            "INVALID_TRANSITION"
        );
        assert_eq!(
            AppError::QuotaExceeded(String::new()).error_code(),
            "QUOTA_EXCEEDED"
        );
        assert_eq!(
            AppError::SignatureInvalid(String::new()).error_code(),
            "SIGNATURE_INVALID"
        );
        assert_eq!(
            AppError::AmountMismatch(String::new()).error_code(),
            "AMOUNT_MISMATCH"
        );
        assert_eq!(
            AppError::IdempotencyConflict(String::new()).error_code(),
            "IDEMPOTENCY_CONFLICT"
        );
        assert_eq!(
            AppError::ProviderUnavailable(String::new()).error_code(),
            "PROVIDER_UNAVAILABLE"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::QuotaExceeded("cameras 5/4".into()).to_string(),
            "Quota exceeded: cameras 5/4"
        );
        assert_eq!(
            AppError::SignatureInvalid("checksum mismatch".into()).to_string(),
            "Signature invalid: checksum mismatch"
        );
    }
}
