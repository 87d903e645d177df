//! Subscription lifecycle repository.
//!
//! Every mutating operation serializes on the subscription row with
//! `SELECT ... FOR UPDATE`, so concurrent upgrades, renewals and
//! callbacks for one user execute one at a time.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::lifecycle::{
    self, BillingType, DeliveryData, LifecycleError, period_end_after, require_downgrade,
    require_upgrade,
};
use vigil_core::proration::{self, Proration};
use vigil_shared::{Currency, Money};

use crate::entities::{
    payments, plan_versions,
    sea_orm_active_enums::{PaymentStatus, PlanState, SubscriptionStatus},
    subscriptions,
};
use crate::repositories::idempotency::{IdempotencyRepository, IdempotencyStart, fingerprint};
use crate::repositories::payment::insert_pending;

/// Error types for subscription operations.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// No live subscription for the user.
    #[error("No live subscription for user {0}")]
    NotFound(Uuid),

    /// Target plan has no current active version.
    #[error("Plan '{0}' has no current version")]
    PlanNotFound(String),

    /// State machine or tier guard rejected the operation.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Subscription has no billable renewal (free tier).
    #[error("Subscription has no billable renewal")]
    NotRenewable,

    /// No pending manual-renewal payment exists.
    #[error("No pending manual-renewal payment")]
    PaymentNotFound,

    /// The payment already reached a terminal state.
    #[error("Payment is no longer pending")]
    PaymentNotPending,

    /// Idempotency key reused with a different request.
    #[error("Idempotency key reused with a different request")]
    IdempotencyConflict,

    /// Stored delivery data failed to (de)serialize.
    #[error("Corrupt delivery data: {0}")]
    DeliveryData(#[from] serde_json::Error),

    /// Stored currency code failed to parse.
    #[error("Unknown currency '{0}' on record")]
    Currency(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Outcome of preparing an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpgradeDecision {
    /// Nothing was due; the plan change was applied immediately.
    Applied {
        /// The updated subscription.
        subscription: subscriptions::Model,
    },
    /// A prorated amount is due; a pending payment was created and the
    /// caller must redirect the user to the provider.
    PaymentRequired {
        /// The pending payment (carries `provider_ref` for the redirect).
        payment: payments::Model,
        /// Unused value of the old plan, minor units.
        credit_minor: i64,
        /// Prorated cost of the new plan, minor units.
        charge_minor: i64,
        /// Amount due now, minor units.
        net_due_minor: i64,
    },
}

/// Repository for subscription lifecycle operations.
#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    db: DatabaseConnection,
}

impl SubscriptionRepository {
    /// Creates a new subscription repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds the user's live (non-cancelled) subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_live_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<subscriptions::Model>, SubscriptionError> {
        let sub = subscriptions::Entity::find()
            .filter(subscriptions::Column::UserId.eq(user_id))
            .filter(subscriptions::Column::Status.ne(SubscriptionStatus::Cancelled))
            .one(&self.db)
            .await?;

        Ok(sub)
    }

    /// Creates the user's free-tier subscription. Idempotent: racing
    /// calls converge on the same row via the one-live-per-user unique
    /// index plus a re-read.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::PlanNotFound` if the catalog has no
    /// active plan at all.
    pub async fn create_free(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<subscriptions::Model, SubscriptionError> {
        if let Some(existing) = self.find_live_by_user(user_id).await? {
            return Ok(existing);
        }

        let plan = plan_versions::Entity::find()
            .filter(plan_versions::Column::IsCurrent.eq(true))
            .filter(plan_versions::Column::State.eq(PlanState::Active))
            .order_by_asc(plan_versions::Column::Tier)
            .one(&self.db)
            .await?
            .ok_or_else(|| SubscriptionError::PlanNotFound("<lowest tier>".to_string()))?;

        let period: lifecycle::BillingPeriod = plan.billing_period.clone().into();
        let sub = subscriptions::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            plan_code: Set(plan.code.clone()),
            plan_version_id: Set(plan.id),
            status: Set(SubscriptionStatus::Active),
            current_period_start: Set(now.into()),
            current_period_end: Set(period_end_after(now, period).into()),
            billing_period: Set(plan.billing_period),
            billing_type: Set(crate::entities::sea_orm_active_enums::BillingType::Prepaid),
            auto_renew: Set(false),
            last_payment_at: Set(None),
            pending_downgrade_code: Set(None),
            pending_downgrade_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        match sub.insert(&self.db).await {
            Ok(model) => Ok(model),
            Err(err) => {
                // Lost the creation race; the unique index rejected the
                // duplicate, so the winner's row must exist.
                if let Some(existing) = self.find_live_by_user(user_id).await? {
                    return Ok(existing);
                }
                Err(err.into())
            }
        }
    }

    /// Prepares a plan upgrade: validates the tier, prorates the change,
    /// and either applies it immediately (nothing due) or creates a
    /// pending payment.
    ///
    /// With an idempotency key, a replay returns the recorded decision
    /// and a key reuse with different content is rejected.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotAnUpgrade` (wrapped) when the target
    /// tier is not strictly higher, regardless of price.
    pub async fn prepare_upgrade(
        &self,
        user_id: Uuid,
        target_code: &str,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<UpgradeDecision, SubscriptionError> {
        let txn = self.db.begin().await?;

        let sub = lock_live(&txn, user_id)
            .await?
            .ok_or(SubscriptionError::NotFound(user_id))?;

        if let Some(key) = idempotency_key {
            let fp = fingerprint(&["plan.upgrade", &user_id.to_string(), target_code]);
            match IdempotencyRepository::begin(&txn, key, &fp, now).await? {
                IdempotencyStart::Fresh => {}
                IdempotencyStart::Replayed(snapshot) => {
                    txn.commit().await?;
                    return Ok(serde_json::from_value(snapshot)?);
                }
                IdempotencyStart::Conflict => return Err(SubscriptionError::IdempotencyConflict),
            }
        }

        let current_plan = plan_versions::Entity::find_by_id(sub.plan_version_id)
            .one(&txn)
            .await?
            .ok_or_else(|| SubscriptionError::PlanNotFound(sub.plan_code.clone()))?;
        let target = current_version_of(&txn, target_code).await?;

        require_upgrade(current_plan.tier, target.tier)?;

        let old_price = price_of(&current_plan)?;
        let new_price = price_of(&target)?;

        let period_end = sub.current_period_end.with_timezone(&Utc);
        let prorated = if now >= period_end {
            // Lapsed period: nothing to credit, full price buys a fresh one
            Proration::full_price(new_price)
        } else {
            proration::calculate(
                old_price,
                new_price,
                sub.current_period_start.with_timezone(&Utc),
                period_end,
                now,
            )
        };

        let decision = if prorated.net_due.is_zero() {
            let status: SubscriptionStatus = lifecycle::SubscriptionStatus::from(
                sub.status.clone(),
            )
            .transition_to(lifecycle::SubscriptionStatus::Active)?
            .into();

            let mut active: subscriptions::ActiveModel = sub.into();
            active.plan_code = Set(target.code.clone());
            active.plan_version_id = Set(target.id);
            active.billing_period = Set(target.billing_period.clone());
            active.status = Set(status);
            let updated = active.update(&txn).await?;

            tracing::info!(user_id = %user_id, plan = %target.code, "zero-cost upgrade applied");

            UpgradeDecision::Applied {
                subscription: updated,
            }
        } else {
            let delivery = DeliveryData::NewPlan {
                plan_code: target.code.clone(),
            };
            let payment = insert_pending(
                &txn,
                user_id,
                prorated.net_due,
                &delivery,
                idempotency_key,
                now,
            )
            .await?;

            tracing::info!(
                user_id = %user_id,
                plan = %target.code,
                net_due_minor = prorated.net_due.amount_minor,
                provider_ref = %payment.provider_ref,
                "prorated upgrade requires payment"
            );

            UpgradeDecision::PaymentRequired {
                payment,
                credit_minor: prorated.credit.amount_minor,
                charge_minor: prorated.charge.amount_minor,
                net_due_minor: prorated.net_due.amount_minor,
            }
        };

        if let Some(key) = idempotency_key {
            IdempotencyRepository::complete(&txn, key, serde_json::to_value(&decision)?).await?;
        }

        txn.commit().await?;

        Ok(decision)
    }

    /// Schedules a downgrade to take effect at renewal (or at an
    /// explicit `effective_at`). Never mutates the plan mid-period.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotADowngrade` (wrapped) when the target
    /// tier is not strictly lower.
    pub async fn schedule_downgrade(
        &self,
        user_id: Uuid,
        target_code: &str,
        effective_at: Option<DateTime<Utc>>,
    ) -> Result<subscriptions::Model, SubscriptionError> {
        let txn = self.db.begin().await?;

        let sub = lock_live(&txn, user_id)
            .await?
            .ok_or(SubscriptionError::NotFound(user_id))?;

        let current_plan = plan_versions::Entity::find_by_id(sub.plan_version_id)
            .one(&txn)
            .await?
            .ok_or_else(|| SubscriptionError::PlanNotFound(sub.plan_code.clone()))?;
        let target = current_version_of(&txn, target_code).await?;

        require_downgrade(current_plan.tier, target.tier)?;

        let effective = effective_at.unwrap_or_else(|| sub.current_period_end.with_timezone(&Utc));

        let mut active: subscriptions::ActiveModel = sub.into();
        active.pending_downgrade_code = Set(Some(target.code.clone()));
        active.pending_downgrade_at = Set(Some(effective.into()));
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(
            user_id = %user_id,
            plan = %target.code,
            effective_at = %effective,
            "downgrade scheduled"
        );

        Ok(updated)
    }

    /// Lifecycle touch: applies a due scheduled downgrade and marks a
    /// lapsed non-auto-renew period `past_due`. Called on reads so state
    /// converges without a background job.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::NotFound` if the user has no live
    /// subscription.
    pub async fn refresh(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<subscriptions::Model, SubscriptionError> {
        let txn = self.db.begin().await?;

        let sub = lock_live(&txn, user_id)
            .await?
            .ok_or(SubscriptionError::NotFound(user_id))?;

        let downgrade_due = matches!(
            (&sub.pending_downgrade_code, sub.pending_downgrade_at),
            (Some(_), Some(at)) if at.with_timezone(&Utc) <= now
        );
        let lapsed = !sub.auto_renew
            && sub.current_period_end.with_timezone(&Utc) <= now
            && matches!(
                sub.status,
                SubscriptionStatus::Active | SubscriptionStatus::Trialing
            );

        if !downgrade_due && !lapsed {
            txn.commit().await?;
            return Ok(sub);
        }

        let mut sub = sub;
        if downgrade_due {
            sub = apply_downgrade(&txn, sub, now).await?;
        }
        if lapsed {
            let status: SubscriptionStatus =
                lifecycle::SubscriptionStatus::from(sub.status.clone())
                    .transition_to(lifecycle::SubscriptionStatus::PastDue)?
                    .into();
            let mut active: subscriptions::ActiveModel = sub.into();
            active.status = Set(status);
            sub = active.update(&txn).await?;

            tracing::info!(user_id = %user_id, "subscription period lapsed; now past_due");
        }

        txn.commit().await?;

        Ok(sub)
    }

    /// Requests a manual renewal. At most one pending manual-renewal
    /// payment exists per subscription; a repeat request returns the
    /// existing one.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::NotRenewable` for free-tier
    /// subscriptions.
    pub async fn request_manual_renewal(
        &self,
        user_id: Uuid,
        billing_period: Option<lifecycle::BillingPeriod>,
        billing_type: Option<BillingType>,
        now: DateTime<Utc>,
    ) -> Result<payments::Model, SubscriptionError> {
        let txn = self.db.begin().await?;

        let sub = lock_live(&txn, user_id)
            .await?
            .ok_or(SubscriptionError::NotFound(user_id))?;

        if let Some(existing) = find_pending_renewal_on(&txn, user_id).await? {
            txn.commit().await?;
            return Ok(existing);
        }

        let plan = plan_versions::Entity::find_by_id(sub.plan_version_id)
            .one(&txn)
            .await?
            .ok_or_else(|| SubscriptionError::PlanNotFound(sub.plan_code.clone()))?;
        let price = price_of(&plan)?;

        let period = billing_period.unwrap_or_else(|| sub.billing_period.clone().into());
        if price.is_zero() || period == lifecycle::BillingPeriod::None {
            return Err(SubscriptionError::NotRenewable);
        }

        let delivery = DeliveryData::Renewal {
            billing_period: period,
            billing_type: billing_type.unwrap_or_else(|| sub.billing_type.clone().into()),
        };
        let payment = insert_pending(&txn, user_id, price, &delivery, None, now).await?;

        txn.commit().await?;

        tracing::info!(
            user_id = %user_id,
            provider_ref = %payment.provider_ref,
            "manual renewal payment created"
        );

        Ok(payment)
    }

    /// Finds the user's pending manual-renewal payment, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_pending_renewal(
        &self,
        user_id: Uuid,
    ) -> Result<Option<payments::Model>, SubscriptionError> {
        find_pending_renewal_on(&self.db, user_id).await
    }

    /// Cancels the user's pending manual-renewal payment. Only a
    /// `pending` payment may be cancelled.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::PaymentNotPending` if the payment
    /// reached a terminal state first.
    pub async fn cancel_pending_manual_renewal(
        &self,
        user_id: Uuid,
    ) -> Result<payments::Model, SubscriptionError> {
        let payment = find_pending_renewal_on(&self.db, user_id)
            .await?
            .ok_or(SubscriptionError::PaymentNotFound)?;

        // CAS: a concurrent callback may have already confirmed it
        let updated = payments::Entity::update_many()
            .col_expr(
                payments::Column::Status,
                sea_orm::sea_query::Expr::value(PaymentStatus::Cancelled),
            )
            .filter(payments::Column::Id.eq(payment.id))
            .filter(payments::Column::Status.eq(PaymentStatus::Pending))
            .exec(&self.db)
            .await?;

        if updated.rows_affected == 0 {
            return Err(SubscriptionError::PaymentNotPending);
        }

        payments::Entity::find_by_id(payment.id)
            .one(&self.db)
            .await?
            .ok_or(SubscriptionError::PaymentNotFound)
    }

    /// Cancels the subscription. Terminal: coming back requires a new
    /// subscription.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::NotFound` if no live subscription
    /// exists.
    pub async fn cancel(&self, user_id: Uuid) -> Result<subscriptions::Model, SubscriptionError> {
        let txn = self.db.begin().await?;

        let sub = lock_live(&txn, user_id)
            .await?
            .ok_or(SubscriptionError::NotFound(user_id))?;

        let status: SubscriptionStatus = lifecycle::SubscriptionStatus::from(sub.status.clone())
            .transition_to(lifecycle::SubscriptionStatus::Cancelled)?
            .into();

        let mut active: subscriptions::ActiveModel = sub.into();
        active.status = Set(status);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(user_id = %user_id, "subscription cancelled");

        Ok(updated)
    }
}

/// Applies a successful payment's delivery data to the subscription.
///
/// Runs on the caller's connection so the payment-callback transaction
/// covers both the payment CAS and the subscription mutation. Repeated
/// invocation for one payment is prevented upstream by the CAS.
///
/// # Errors
///
/// Returns `SubscriptionError::DeliveryData` if the stored payload does
/// not parse.
pub async fn apply_payment_success<C: ConnectionTrait>(
    conn: &C,
    payment: &payments::Model,
    now: DateTime<Utc>,
) -> Result<subscriptions::Model, SubscriptionError> {
    let delivery: DeliveryData = serde_json::from_value(payment.delivery_data.clone())?;

    let sub = lock_live(conn, payment.user_id)
        .await?
        .ok_or(SubscriptionError::NotFound(payment.user_id))?;

    match delivery {
        DeliveryData::NewPlan { plan_code } => {
            let target = current_version_of(conn, &plan_code).await?;

            let status: SubscriptionStatus =
                lifecycle::SubscriptionStatus::from(sub.status.clone())
                    .transition_to(lifecycle::SubscriptionStatus::Active)?
                    .into();

            let lapsed = sub.current_period_end.with_timezone(&Utc) <= now;
            let mut active: subscriptions::ActiveModel = sub.into();
            active.plan_code = Set(target.code.clone());
            active.plan_version_id = Set(target.id);
            active.billing_period = Set(target.billing_period.clone());
            active.status = Set(status);
            active.last_payment_at = Set(Some(now.into()));
            if lapsed {
                // Full price bought a fresh period instead of proration
                let period: lifecycle::BillingPeriod = target.billing_period.into();
                active.current_period_start = Set(now.into());
                active.current_period_end = Set(period_end_after(now, period).into());
            }

            tracing::info!(user_id = %payment.user_id, plan = %target.code, "paid upgrade applied");

            Ok(active.update(conn).await?)
        }
        DeliveryData::Renewal {
            billing_period,
            billing_type,
        } => {
            // A due scheduled downgrade lands exactly at renewal
            let downgrade_due = matches!(
                (&sub.pending_downgrade_code, sub.pending_downgrade_at),
                (Some(_), Some(at)) if at.with_timezone(&Utc) <= now
            );
            let sub = if downgrade_due {
                apply_downgrade(conn, sub, now).await?
            } else {
                sub
            };

            let status: SubscriptionStatus =
                lifecycle::SubscriptionStatus::from(sub.status.clone())
                    .transition_to(lifecycle::SubscriptionStatus::Active)?
                    .into();

            let old_end = sub.current_period_end.with_timezone(&Utc);
            let start = if now < old_end { old_end } else { now };

            let mut active: subscriptions::ActiveModel = sub.into();
            active.status = Set(status);
            active.current_period_start = Set(start.into());
            active.current_period_end = Set(period_end_after(start, billing_period).into());
            active.billing_period = Set(billing_period.into());
            active.billing_type = Set(billing_type.into());
            active.last_payment_at = Set(Some(now.into()));

            tracing::info!(user_id = %payment.user_id, "renewal applied");

            Ok(active.update(conn).await?)
        }
        DeliveryData::DowngradeAtRenewal { plan_code } => {
            let effective = sub.current_period_end;
            let mut active: subscriptions::ActiveModel = sub.into();
            active.pending_downgrade_code = Set(Some(plan_code));
            active.pending_downgrade_at = Set(Some(effective));
            active.last_payment_at = Set(Some(now.into()));

            Ok(active.update(conn).await?)
        }
    }
}

/// Locks the user's live subscription row for the transaction.
async fn lock_live<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<subscriptions::Model>, DbErr> {
    subscriptions::Entity::find()
        .filter(subscriptions::Column::UserId.eq(user_id))
        .filter(subscriptions::Column::Status.ne(SubscriptionStatus::Cancelled))
        .lock_exclusive()
        .one(conn)
        .await
}

/// Looks up the current active version of a plan code.
async fn current_version_of<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<plan_versions::Model, SubscriptionError> {
    plan_versions::Entity::find()
        .filter(plan_versions::Column::Code.eq(code))
        .filter(plan_versions::Column::IsCurrent.eq(true))
        .filter(plan_versions::Column::State.eq(PlanState::Active))
        .one(conn)
        .await?
        .ok_or_else(|| SubscriptionError::PlanNotFound(code.to_string()))
}

/// Swaps the subscription onto its pending downgrade target and clears
/// the pending marker. Period bounds are kept; the caller decides
/// whether a new period starts.
async fn apply_downgrade<C: ConnectionTrait>(
    conn: &C,
    sub: subscriptions::Model,
    now: DateTime<Utc>,
) -> Result<subscriptions::Model, SubscriptionError> {
    let Some(code) = sub.pending_downgrade_code.clone() else {
        return Ok(sub);
    };
    let target = current_version_of(conn, &code).await?;
    let user_id = sub.user_id;

    let free_target = target.price_minor == 0;
    let mut active: subscriptions::ActiveModel = sub.into();
    active.plan_code = Set(target.code.clone());
    active.plan_version_id = Set(target.id);
    active.pending_downgrade_code = Set(None);
    active.pending_downgrade_at = Set(None);
    if free_target {
        // The free tier has no renewal to pay; open a fresh horizon
        let period: lifecycle::BillingPeriod = target.billing_period.clone().into();
        active.billing_period = Set(target.billing_period);
        active.current_period_start = Set(now.into());
        active.current_period_end = Set(period_end_after(now, period).into());
    }

    let updated = active.update(conn).await?;

    tracing::info!(user_id = %user_id, plan = %target.code, "scheduled downgrade applied");

    Ok(updated)
}

/// Finds the user's pending manual-renewal payment by scanning the few
/// pending rows and matching the delivery payload kind.
async fn find_pending_renewal_on<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<payments::Model>, SubscriptionError> {
    let pending = payments::Entity::find()
        .filter(payments::Column::UserId.eq(user_id))
        .filter(payments::Column::Status.eq(PaymentStatus::Pending))
        .all(conn)
        .await?;

    for payment in pending {
        let delivery: DeliveryData = serde_json::from_value(payment.delivery_data.clone())?;
        if matches!(delivery, DeliveryData::Renewal { .. }) {
            return Ok(Some(payment));
        }
    }

    Ok(None)
}

/// Extracts a version's price as a typed amount.
fn price_of(model: &plan_versions::Model) -> Result<Money, SubscriptionError> {
    let currency: Currency = model
        .currency
        .parse()
        .map_err(|_| SubscriptionError::Currency(model.currency.clone()))?;
    Ok(Money::new(model.price_minor, currency))
}
