//! Payment reconciliation repository.
//!
//! A payment leaves `pending` exactly once: terminal transitions go
//! through a compare-and-set (`UPDATE ... WHERE status = 'pending'`) or
//! run under the payment row lock inside the callback transaction, so a
//! duplicated provider callback can never double-apply a delivery.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use vigil_core::lifecycle::DeliveryData;
use vigil_core::payment::CallbackParams;
use vigil_shared::Money;

use crate::entities::{payments, sea_orm_active_enums::PaymentStatus};
use crate::repositories::idempotency::{IdempotencyRepository, IdempotencyStart, fingerprint};
use crate::repositories::subscription::{SubscriptionError, apply_payment_success};

/// Provider identifier recorded on rows created for the VNPay flow.
pub const PROVIDER_VNPAY: &str = "vnpay";

/// Error types for payment operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// No payment matched the lookup.
    #[error("Payment not found: {0}")]
    NotFound(String),

    /// The payment already reached a terminal state.
    #[error("Payment is no longer pending")]
    AlreadyTerminal,

    /// Idempotency key reused with a different request.
    #[error("Idempotency key reused with a different request")]
    IdempotencyConflict,

    /// Delivery data failed to (de)serialize.
    #[error("Corrupt delivery data: {0}")]
    DeliveryData(#[from] serde_json::Error),

    /// Applying the delivery to the subscription failed.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Outcome of reconciling a verified provider callback.
///
/// Signature verification happens before this repository is reached; by
/// the time a callback lands here its authenticity is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The callback was applied: the payment reached `paid` or `failed`
    /// and, on success, the delivery was executed.
    Applied(payments::Model),
    /// The payment was already terminal; the recorded outcome stands.
    AlreadyProcessed(payments::Model),
    /// The callback amount did not match the recorded amount. Nothing
    /// was mutated.
    AmountMismatch(payments::Model),
    /// No payment carries this transaction reference.
    OrderNotFound,
}

/// Inserts a pending payment row on the caller's connection.
///
/// `provider_ref` is freshly generated and is what the provider echoes
/// back as `vnp_TxnRef`.
///
/// # Errors
///
/// Returns an error if serialization or the insert fails.
pub async fn insert_pending<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    amount: Money,
    delivery: &DeliveryData,
    idempotency_key: Option<&str>,
    now: DateTime<Utc>,
) -> Result<payments::Model, SubscriptionError> {
    let payment = payments::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        amount_minor: Set(amount.amount_minor),
        currency: Set(amount.currency.to_string()),
        provider: Set(PROVIDER_VNPAY.to_string()),
        status: Set(PaymentStatus::Pending),
        delivery_data: Set(serde_json::to_value(delivery)?),
        idempotency_key: Set(idempotency_key.map(ToString::to_string)),
        provider_ref: Set(Uuid::new_v4().simple().to_string()),
        provider_response_code: Set(None),
        paid_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    Ok(payment.insert(conn).await?)
}

/// Repository for payment operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    db: DatabaseConnection,
}

impl PaymentRepository {
    /// Creates a new payment repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a pending payment for an explicit delivery.
    ///
    /// With an idempotency key, a replay returns the originally created
    /// payment; a key reuse with different content is rejected. The key
    /// mapping is recorded atomically with the payment row.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::IdempotencyConflict` on fingerprint
    /// mismatch.
    pub async fn create(
        &self,
        user_id: Uuid,
        amount: Money,
        delivery: &DeliveryData,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<payments::Model, PaymentError> {
        let txn = self.db.begin().await?;

        if let Some(key) = idempotency_key {
            let fp = fingerprint(&[
                "payment.create",
                &user_id.to_string(),
                &amount.to_string(),
                &serde_json::to_string(delivery)?,
            ]);
            match IdempotencyRepository::begin(&txn, key, &fp, now).await? {
                IdempotencyStart::Fresh => {}
                IdempotencyStart::Replayed(snapshot) => {
                    txn.commit().await?;
                    return Ok(serde_json::from_value(snapshot)?);
                }
                IdempotencyStart::Conflict => return Err(PaymentError::IdempotencyConflict),
            }
        }

        let payment = insert_pending(&txn, user_id, amount, delivery, idempotency_key, now)
            .await
            .map_err(PaymentError::Subscription)?;

        if let Some(key) = idempotency_key {
            IdempotencyRepository::complete(&txn, key, serde_json::to_value(&payment)?).await?;
        }

        txn.commit().await?;

        Ok(payment)
    }

    /// Finds a payment by its provider transaction reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<payments::Model>, PaymentError> {
        let payment = payments::Entity::find()
            .filter(payments::Column::ProviderRef.eq(provider_ref))
            .one(&self.db)
            .await?;

        Ok(payment)
    }

    /// Finds a payment by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<payments::Model>, PaymentError> {
        Ok(payments::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Reconciles a verified callback (return URL or IPN) against the
    /// recorded payment.
    ///
    /// Runs in one transaction: the payment row is locked, the terminal
    /// transition happens at most once, and a successful payment applies
    /// its delivery to the subscription before commit. Safe against
    /// duplicate and concurrent callbacks.
    ///
    /// # Errors
    ///
    /// Returns an error only on infrastructure failure; business
    /// rejections are expressed in [`CallbackOutcome`].
    pub async fn reconcile_callback(
        &self,
        params: &CallbackParams,
        now: DateTime<Utc>,
    ) -> Result<CallbackOutcome, PaymentError> {
        let txn = self.db.begin().await?;

        let Some(payment) = payments::Entity::find()
            .filter(payments::Column::ProviderRef.eq(&params.txn_ref))
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            return Ok(CallbackOutcome::OrderNotFound);
        };

        if !payment.status.is_pending() {
            txn.commit().await?;
            return Ok(CallbackOutcome::AlreadyProcessed(payment));
        }

        if params.amount_minor != payment.amount_minor {
            tracing::warn!(
                provider_ref = %params.txn_ref,
                expected_minor = payment.amount_minor,
                got_minor = params.amount_minor,
                "callback amount mismatch"
            );
            return Ok(CallbackOutcome::AmountMismatch(payment));
        }

        let success = params.is_success();
        let mut active: payments::ActiveModel = payment.clone().into();
        active.status = Set(if success {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        });
        active.provider_response_code = Set(Some(params.response_code.clone()));
        active.paid_at = Set(success.then(|| now.into()));
        let updated = active.update(&txn).await?;

        if success {
            apply_payment_success(&txn, &updated, now).await?;
        }

        txn.commit().await?;

        tracing::info!(
            provider_ref = %params.txn_ref,
            status = ?updated.status,
            "payment callback reconciled"
        );

        Ok(CallbackOutcome::Applied(updated))
    }

    /// Resolves a stale pending payment from a provider `querydr`
    /// response code.
    ///
    /// Same single-writer guarantees as callback reconciliation; a
    /// non-definitive code leaves the payment pending.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotFound` if the reference is unknown.
    pub async fn resolve_from_provider(
        &self,
        provider_ref: &str,
        response_code: &str,
        now: DateTime<Utc>,
    ) -> Result<payments::Model, PaymentError> {
        let txn = self.db.begin().await?;

        let payment = payments::Entity::find()
            .filter(payments::Column::ProviderRef.eq(provider_ref))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| PaymentError::NotFound(provider_ref.to_string()))?;

        if !payment.status.is_pending() {
            txn.commit().await?;
            return Ok(payment);
        }

        let success = response_code == "00";
        let mut active: payments::ActiveModel = payment.into();
        active.status = Set(if success {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        });
        active.provider_response_code = Set(Some(response_code.to_string()));
        active.paid_at = Set(success.then(|| now.into()));
        let updated = active.update(&txn).await?;

        if success {
            apply_payment_success(&txn, &updated, now).await?;
        }

        txn.commit().await?;

        Ok(updated)
    }

    /// Marks a payment terminal via CAS, without touching the
    /// subscription. Used for cancellations and manual admin paths.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::AlreadyTerminal` if the payment was no
    /// longer pending.
    pub async fn mark_terminal(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<payments::Model, PaymentError> {
        let updated = payments::Entity::update_many()
            .col_expr(payments::Column::Status, Expr::value(status))
            .filter(payments::Column::Id.eq(id))
            .filter(payments::Column::Status.eq(PaymentStatus::Pending))
            .exec(&self.db)
            .await?;

        if updated.rows_affected == 0 {
            return Err(PaymentError::AlreadyTerminal);
        }

        payments::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))
    }

    /// Lists pending payments older than `cutoff`, candidates for active
    /// reconciliation against the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<payments::Model>, PaymentError> {
        let stale = payments::Entity::find()
            .filter(payments::Column::Status.eq(PaymentStatus::Pending))
            .filter(payments::Column::CreatedAt.lt(cutoff))
            .all(&self.db)
            .await?;

        Ok(stale)
    }
}
