//! Quota override and grace-window state repository.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use uuid::Uuid;
use vigil_core::quota::{GraceState, QuotaOverrides, ResourceKind};

use crate::entities::{quota_grace, quota_overrides};

/// Repository for per-user quota overrides and grace tracking.
#[derive(Debug, Clone)]
pub struct QuotaRepository {
    db: DatabaseConnection,
}

impl QuotaRepository {
    /// Creates a new quota repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Fetches the user's admin-granted overrides, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_overrides(&self, user_id: Uuid) -> Result<Option<QuotaOverrides>, DbErr> {
        let row = quota_overrides::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?;

        Ok(row.map(|r| QuotaOverrides {
            camera_quota: r.camera_quota,
            caregiver_seats: r.caregiver_seats,
            storage_gb: r.storage_gb,
            sites: r.sites,
        }))
    }

    /// Upserts the user's overrides. Null fields defer to the plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn grant_overrides(
        &self,
        user_id: Uuid,
        overrides: QuotaOverrides,
        granted_by: Uuid,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        let record = quota_overrides::ActiveModel {
            user_id: Set(user_id),
            camera_quota: Set(overrides.camera_quota),
            caregiver_seats: Set(overrides.caregiver_seats),
            storage_gb: Set(overrides.storage_gb),
            sites: Set(overrides.sites),
            granted_by: Set(granted_by),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        quota_overrides::Entity::insert(record)
            .on_conflict(
                OnConflict::column(quota_overrides::Column::UserId)
                    .update_columns([
                        quota_overrides::Column::CameraQuota,
                        quota_overrides::Column::CaregiverSeats,
                        quota_overrides::Column::StorageGb,
                        quota_overrides::Column::Sites,
                        quota_overrides::Column::GrantedBy,
                        quota_overrides::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    /// Fetches the grace state for a (user, resource) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn grace_state(
        &self,
        user_id: Uuid,
        resource: ResourceKind,
    ) -> Result<GraceState, DbErr> {
        let row = quota_grace::Entity::find_by_id((user_id, resource.to_string()))
            .one(&self.db)
            .await?;

        Ok(GraceState {
            exceeded_at: row.map(|r| r.exceeded_at.with_timezone(&Utc)),
        })
    }

    /// Reconciles the grace marker with the observed usage and returns
    /// the state the evaluator should see.
    ///
    /// The first over-quota observation anchors the window; dropping
    /// back under quota clears it so the next overage starts fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn sync_grace(
        &self,
        user_id: Uuid,
        resource: ResourceKind,
        over_quota: bool,
        now: DateTime<Utc>,
    ) -> Result<GraceState, DbErr> {
        let existing = self.grace_state(user_id, resource).await?;

        if over_quota {
            if existing.exceeded_at.is_some() {
                return Ok(existing);
            }
            let marker = quota_grace::ActiveModel {
                user_id: Set(user_id),
                resource: Set(resource.to_string()),
                exceeded_at: Set(now.into()),
                created_at: Set(now.into()),
            };
            // Racing first observations agree on "now"; keep the earliest
            quota_grace::Entity::insert(marker)
                .on_conflict(
                    OnConflict::columns([
                        quota_grace::Column::UserId,
                        quota_grace::Column::Resource,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await?;

            return self.grace_state(user_id, resource).await;
        }

        if existing.exceeded_at.is_some() {
            quota_grace::Entity::delete_by_id((user_id, resource.to_string()))
                .exec(&self.db)
                .await?;
        }

        Ok(GraceState { exceeded_at: None })
    }
}
