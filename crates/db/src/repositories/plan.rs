//! Plan catalog repository.
//!
//! Versions are immutable once published; catalog changes always publish
//! a new version. Activation runs under sibling row locks so the
//! "single current version per code" invariant holds even against
//! concurrent activations (belt and braces with the partial unique index).

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use vigil_core::plan::{PlanError, PlanQuotas, PlanSnapshot, VersionState};
use vigil_shared::{Currency, Money};

use crate::entities::{
    plan_versions,
    sea_orm_active_enums::{BillingPeriod, PlanState},
    subscriptions,
};

/// Error types for plan catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No version matched the lookup.
    #[error("Plan '{0}' has no matching version")]
    PlanNotFound(String),

    /// Version row not found.
    #[error("Plan version not found: {0}")]
    VersionNotFound(Uuid),

    /// A new version's effective range overlaps an existing one.
    #[error("Effective range overlaps an existing version of plan '{0}'")]
    OverlappingRange(String),

    /// Version is still referenced by subscriptions.
    #[error("Plan version is referenced by {0} subscriptions")]
    Referenced(u64),

    /// Version state machine rejected the transition.
    #[error(transparent)]
    State(#[from] PlanError),

    /// Stored currency code failed to parse.
    #[error("Unknown currency '{0}' on plan version")]
    Currency(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Input for publishing a new plan version (created as draft).
#[derive(Debug, Clone)]
pub struct CreateVersionInput {
    /// Plan code, shared across versions.
    pub code: String,
    /// Version label, unique within the code.
    pub version: String,
    /// Tier for upgrade/downgrade comparison.
    pub tier: i32,
    /// Price per billing period.
    pub price: Money,
    /// Billing period.
    pub billing_period: BillingPeriod,
    /// Quota limits; `None` fields mean unlimited.
    pub quotas: PlanQuotas,
    /// Start of the effective range.
    pub effective_from: DateTime<Utc>,
    /// Exclusive end of the effective range; `None` = open-ended.
    pub effective_to: Option<DateTime<Utc>>,
}

/// Repository for plan catalog operations.
#[derive(Debug, Clone)]
pub struct PlanRepository {
    db: DatabaseConnection,
}

/// Builds the immutable snapshot a subscription binds to.
///
/// # Errors
///
/// Returns `CatalogError::Currency` if the stored currency is unknown.
pub fn snapshot(model: &plan_versions::Model) -> Result<PlanSnapshot, CatalogError> {
    Ok(PlanSnapshot {
        version_id: model.id,
        code: model.code.clone(),
        version: model.version.clone(),
        tier: model.tier,
        price: price_of(model)?,
        billing_period: model.billing_period.clone().into(),
        quotas: quotas_of(model),
    })
}

/// Extracts the price as a typed amount.
///
/// # Errors
///
/// Returns `CatalogError::Currency` if the stored currency is unknown.
pub fn price_of(model: &plan_versions::Model) -> Result<Money, CatalogError> {
    let currency: Currency = model
        .currency
        .parse()
        .map_err(|_| CatalogError::Currency(model.currency.clone()))?;
    Ok(Money::new(model.price_minor, currency))
}

/// Extracts the quota limits of a version.
#[must_use]
pub fn quotas_of(model: &plan_versions::Model) -> PlanQuotas {
    PlanQuotas {
        camera_quota: model.camera_quota,
        retention_days: model.retention_days,
        caregiver_seats: model.caregiver_seats,
        sites: model.sites,
    }
}

impl PlanRepository {
    /// Creates a new plan repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Lists the current version of every plan visible to sign-ups,
    /// ordered by tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_current(&self) -> Result<Vec<plan_versions::Model>, CatalogError> {
        let versions = plan_versions::Entity::find()
            .filter(plan_versions::Column::IsCurrent.eq(true))
            .filter(plan_versions::Column::State.eq(PlanState::Active))
            .order_by_asc(plan_versions::Column::Tier)
            .all(&self.db)
            .await?;

        Ok(versions)
    }

    /// Finds the current version of a plan code.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::PlanNotFound` if the code has no current
    /// active version.
    pub async fn current_version(&self, code: &str) -> Result<plan_versions::Model, CatalogError> {
        plan_versions::Entity::find()
            .filter(plan_versions::Column::Code.eq(code))
            .filter(plan_versions::Column::IsCurrent.eq(true))
            .filter(plan_versions::Column::State.eq(PlanState::Active))
            .one(&self.db)
            .await?
            .ok_or_else(|| CatalogError::PlanNotFound(code.to_string()))
    }

    /// Finds a version row by ID.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::VersionNotFound` if no row matches.
    pub async fn find_by_id(&self, id: Uuid) -> Result<plan_versions::Model, CatalogError> {
        plan_versions::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(CatalogError::VersionNotFound(id))
    }

    /// Finds the version of a plan that was effective at `ts`, using
    /// interval containment `[effective_from, effective_to)`.
    ///
    /// Overlapping ranges are rejected at write time; if legacy data
    /// still violates that, the most recently created row wins and the
    /// violation is logged.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::PlanNotFound` if no version was effective.
    pub async fn version_effective_at(
        &self,
        code: &str,
        ts: DateTime<Utc>,
    ) -> Result<plan_versions::Model, CatalogError> {
        let matches = plan_versions::Entity::find()
            .filter(plan_versions::Column::Code.eq(code))
            .filter(plan_versions::Column::EffectiveFrom.lte(ts))
            .filter(
                Condition::any()
                    .add(plan_versions::Column::EffectiveTo.is_null())
                    .add(plan_versions::Column::EffectiveTo.gt(ts)),
            )
            .order_by_desc(plan_versions::Column::CreatedAt)
            .all(&self.db)
            .await?;

        if matches.len() > 1 {
            tracing::error!(
                plan_code = code,
                at = %ts,
                candidates = matches.len(),
                "overlapping effective ranges in plan catalog; picking newest"
            );
        }

        matches
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::PlanNotFound(code.to_string()))
    }

    /// Finds the lowest-tier plan currently open to sign-ups (the free
    /// tier everyone starts on).
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::PlanNotFound` if the catalog is empty.
    pub async fn lowest_tier_current(&self) -> Result<plan_versions::Model, CatalogError> {
        plan_versions::Entity::find()
            .filter(plan_versions::Column::IsCurrent.eq(true))
            .filter(plan_versions::Column::State.eq(PlanState::Active))
            .order_by_asc(plan_versions::Column::Tier)
            .one(&self.db)
            .await?
            .ok_or_else(|| CatalogError::PlanNotFound("<lowest tier>".to_string()))
    }

    /// Publishes a new draft version.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::OverlappingRange` if the effective range
    /// overlaps an existing version of the same code.
    pub async fn create_version(
        &self,
        input: CreateVersionInput,
    ) -> Result<plan_versions::Model, CatalogError> {
        let mut overlap = Condition::all().add(
            Condition::any()
                .add(plan_versions::Column::EffectiveTo.is_null())
                .add(plan_versions::Column::EffectiveTo.gt(input.effective_from)),
        );
        if let Some(to) = input.effective_to {
            overlap = overlap.add(plan_versions::Column::EffectiveFrom.lt(to));
        }

        let conflicting = plan_versions::Entity::find()
            .filter(plan_versions::Column::Code.eq(&input.code))
            .filter(overlap)
            .count(&self.db)
            .await?;

        if conflicting > 0 {
            return Err(CatalogError::OverlappingRange(input.code));
        }

        let now = Utc::now();
        let version = plan_versions::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code),
            version: Set(input.version),
            tier: Set(input.tier),
            price_minor: Set(input.price.amount_minor),
            currency: Set(input.price.currency.to_string()),
            billing_period: Set(input.billing_period),
            camera_quota: Set(input.quotas.camera_quota),
            retention_days: Set(input.quotas.retention_days),
            caregiver_seats: Set(input.quotas.caregiver_seats),
            sites: Set(input.quotas.sites),
            state: Set(PlanState::Draft),
            is_current: Set(false),
            effective_from: Set(input.effective_from.into()),
            effective_to: Set(input.effective_to.map(Into::into)),
            successor_code: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        Ok(version.insert(&self.db).await?)
    }

    /// Activates a version and makes it the single current one for its
    /// code.
    ///
    /// All sibling rows are locked for the duration so two concurrent
    /// activations serialize; the partial unique index backs this up.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::State` if the version cannot transition to
    /// active (it must be a draft).
    pub async fn activate_version(&self, id: Uuid) -> Result<plan_versions::Model, CatalogError> {
        let txn = self.db.begin().await?;

        let target = plan_versions::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(CatalogError::VersionNotFound(id))?;

        let siblings = plan_versions::Entity::find()
            .filter(plan_versions::Column::Code.eq(&target.code))
            .lock_exclusive()
            .all(&txn)
            .await?;

        // Re-read the target under the lock
        let target = siblings
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or(CatalogError::VersionNotFound(id))?;

        if target.is_current && target.state == PlanState::Active {
            txn.commit().await?;
            return Ok(target);
        }

        let next_state: PlanState = VersionState::from(target.state.clone())
            .transition_to(VersionState::Active)?
            .into();

        // Demote others before promoting the target so the partial
        // unique index never sees two current rows.
        for sibling in siblings {
            if sibling.id != id && sibling.is_current {
                let mut demoted: plan_versions::ActiveModel = sibling.into();
                demoted.is_current = Set(false);
                demoted.update(&txn).await?;
            }
        }

        let mut promoted: plan_versions::ActiveModel = target.into();
        promoted.state = Set(next_state);
        promoted.is_current = Set(true);
        let updated = promoted.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(
            plan_code = %updated.code,
            version = %updated.version,
            "plan version activated"
        );

        Ok(updated)
    }

    /// Deprecates a version: hidden from new sign-ups, existing
    /// subscribers unaffected.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::State` on an invalid transition.
    pub async fn deprecate_version(&self, id: Uuid) -> Result<plan_versions::Model, CatalogError> {
        self.transition(id, VersionState::Deprecated, None).await
    }

    /// Archives a version: existing subscribers migrate to
    /// `successor_code` at their next renewal.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::State` on an invalid transition.
    pub async fn archive_version(
        &self,
        id: Uuid,
        successor_code: &str,
    ) -> Result<plan_versions::Model, CatalogError> {
        self.transition(id, VersionState::Archived, Some(successor_code))
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        to: VersionState,
        successor_code: Option<&str>,
    ) -> Result<plan_versions::Model, CatalogError> {
        let model = self.find_by_id(id).await?;
        let next: PlanState = VersionState::from(model.state.clone())
            .transition_to(to)?
            .into();

        let mut active: plan_versions::ActiveModel = model.into();
        active.state = Set(next);
        // Leaving `active` always vacates the current slot
        active.is_current = Set(false);
        if let Some(code) = successor_code {
            active.successor_code = Set(Some(code.to_string()));
        }

        Ok(active.update(&self.db).await?)
    }

    /// Hard-deletes a version. Forbidden while any subscription still
    /// references it.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Referenced` with the reference count.
    pub async fn delete_version(&self, id: Uuid) -> Result<(), CatalogError> {
        let references = subscriptions::Entity::find()
            .filter(subscriptions::Column::PlanVersionId.eq(id))
            .count(&self.db)
            .await?;

        if references > 0 {
            return Err(CatalogError::Referenced(references));
        }

        plan_versions::Entity::delete_by_id(id).exec(&self.db).await?;

        Ok(())
    }
}
