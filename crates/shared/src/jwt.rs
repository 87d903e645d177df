//! JWT claims and validation.
//!
//! Vigil does not mint tokens; requests arrive with a bearer token issued
//! by the identity service. This module only validates and decodes them.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Authenticated principal carried in the JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID.
    pub sub: Uuid,
    /// Role of the principal ("customer", "caregiver", "admin").
    pub role: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued-at time (Unix timestamp).
    pub iat: i64,
}

impl Claims {
    /// Returns the user ID from the claims.
    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.sub
    }

    /// Returns true if the principal carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Errors that can occur during JWT validation.
#[derive(Debug, Error)]
pub enum JwtError {
    /// Token has expired.
    #[error("token has expired")]
    Expired,

    /// Token is invalid.
    #[error("invalid token")]
    Invalid,
}

/// JWT service for token validation.
#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("decoding_key", &"[hidden]")
            .finish()
    }
}

impl JwtService {
    /// Creates a new JWT service from the shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validates and decodes a token.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Expired` for expired tokens and
    /// `JwtError::Invalid` for anything else that fails validation.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    fn make_token(secret: &str, exp_offset_secs: i64, role: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: role.to_string(),
            exp: now + exp_offset_secs,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_roundtrip() {
        let service = JwtService::new("test-secret");
        let token = make_token("test-secret", 3600, "customer");
        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.role, "customer");
        assert!(!claims.is_admin());
    }

    #[test]
    fn test_admin_role() {
        let service = JwtService::new("test-secret");
        let token = make_token("test-secret", 3600, "admin");
        assert!(service.validate_token(&token).unwrap().is_admin());
    }

    #[test]
    fn test_expired_token() {
        let service = JwtService::new("test-secret");
        let token = make_token("test-secret", -3600, "customer");
        assert!(matches!(
            service.validate_token(&token),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let service = JwtService::new("test-secret");
        let token = make_token("other-secret", 3600, "customer");
        assert!(matches!(
            service.validate_token(&token),
            Err(JwtError::Invalid)
        ));
    }
}
