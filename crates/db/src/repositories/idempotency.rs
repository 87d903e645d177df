//! Idempotency-key bookkeeping.
//!
//! Keys are claimed with an insert-if-absent (`ON CONFLICT DO NOTHING`
//! plus re-read) so concurrent requests with the same key race safely:
//! exactly one caller sees `Fresh`, the rest replay or conflict.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};

use crate::entities::idempotency_keys;

/// How long a recorded key keeps replaying its result.
const KEY_TTL_HOURS: i64 = 24;

/// Outcome of claiming an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyStart {
    /// Key is new; the caller owns the operation and must call
    /// [`IdempotencyRepository::complete`] with the result.
    Fresh,
    /// Key was completed before with the same fingerprint; the stored
    /// result must be returned verbatim.
    Replayed(serde_json::Value),
    /// Key exists with a different fingerprint, or its operation is
    /// still in flight.
    Conflict,
}

/// Computes the SHA-256 fingerprint of an operation's identity.
///
/// The fingerprint binds a key to the request's semantic content so a
/// reused key with a different body is rejected instead of replayed.
#[must_use]
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Repository for idempotency keys. All operations are generic over the
/// connection so they run inside the caller's transaction.
pub struct IdempotencyRepository;

impl IdempotencyRepository {
    /// Claims `key` for an operation with the given fingerprint.
    ///
    /// Expired keys are reclaimed in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn begin<C: ConnectionTrait>(
        conn: &C,
        key: &str,
        operation_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyStart, DbErr> {
        let existing = idempotency_keys::Entity::find_by_id(key).one(conn).await?;
        if let Some(row) = existing {
            if row.expires_at.with_timezone(&Utc) <= now {
                idempotency_keys::Entity::delete_by_id(&row.key)
                    .exec(conn)
                    .await?;
            } else if row.operation_fingerprint != operation_fingerprint {
                return Ok(IdempotencyStart::Conflict);
            } else if let Some(snapshot) = row.result_snapshot {
                return Ok(IdempotencyStart::Replayed(snapshot));
            } else {
                // Same fingerprint but no recorded result: the first
                // attempt is still in flight (or died mid-operation).
                return Ok(IdempotencyStart::Conflict);
            }
        }

        let record = idempotency_keys::ActiveModel {
            key: Set(key.to_string()),
            operation_fingerprint: Set(operation_fingerprint.to_string()),
            result_snapshot: Set(None),
            created_at: Set(now.into()),
            expires_at: Set((now + Duration::hours(KEY_TTL_HOURS)).into()),
        };

        let inserted = idempotency_keys::Entity::insert(record)
            .on_conflict(
                OnConflict::column(idempotency_keys::Column::Key)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        if inserted == 0 {
            // Lost the insert race; re-read and classify.
            let row = idempotency_keys::Entity::find_by_id(key)
                .one(conn)
                .await?
                .ok_or_else(|| DbErr::RecordNotFound(format!("idempotency key {key}")))?;

            if row.operation_fingerprint != operation_fingerprint {
                return Ok(IdempotencyStart::Conflict);
            }
            return Ok(row
                .result_snapshot
                .map_or(IdempotencyStart::Conflict, IdempotencyStart::Replayed));
        }

        Ok(IdempotencyStart::Fresh)
    }

    /// Records the result snapshot for a claimed key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn complete<C: ConnectionTrait>(
        conn: &C,
        key: &str,
        snapshot: serde_json::Value,
    ) -> Result<(), DbErr> {
        idempotency_keys::Entity::update_many()
            .col_expr(
                idempotency_keys::Column::ResultSnapshot,
                sea_orm::sea_query::Expr::value(snapshot),
            )
            .filter(idempotency_keys::Column::Key.eq(key))
            .exec(conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        let a = fingerprint(&["upgrade", "user-1", "premium"]);
        let b = fingerprint(&["upgrade", "premium", "user-1"]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_separator_prevents_ambiguity() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(fingerprint(&["ab", "c"]), fingerprint(&["a", "bc"]));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(
            fingerprint(&["upgrade", "user-1", "premium"]),
            fingerprint(&["upgrade", "user-1", "premium"])
        );
    }
}
