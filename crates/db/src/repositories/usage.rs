//! Live usage counters.
//!
//! Hard-cap admission never trusts a cached counter: every check counts
//! the owning tables at decision time.

use sea_orm::sea_query::{Alias, Expr};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QuerySelect,
};
use uuid::Uuid;
use vigil_core::quota::UsageCounters;

use crate::entities::{cameras, caregiver_links, sites_rooms, storage_objects};

const GIB: i64 = 1024 * 1024 * 1024;

#[derive(FromQueryResult)]
struct StorageTotal {
    total_bytes: Option<i64>,
}

/// Repository for live usage counts over the owning tables.
#[derive(Debug, Clone)]
pub struct UsageRepository {
    db: DatabaseConnection,
}

impl UsageRepository {
    /// Creates a new usage repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Counts the user's current usage across all quota resources.
    ///
    /// Storage is reported in whole GB, rounded up so a single byte over
    /// a boundary counts against the next GB.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub async fn counters(&self, user_id: Uuid) -> Result<UsageCounters, DbErr> {
        let camera_count = cameras::Entity::find()
            .filter(cameras::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        let caregiver_count = caregiver_links::Entity::find()
            .filter(caregiver_links::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        let site_count = sites_rooms::Entity::find()
            .filter(sites_rooms::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        let total = storage_objects::Entity::find()
            .select_only()
            .column_as(
                Expr::col(storage_objects::Column::SizeBytes)
                    .sum()
                    .cast_as(Alias::new("BIGINT")),
                "total_bytes",
            )
            .filter(storage_objects::Column::UserId.eq(user_id))
            .into_model::<StorageTotal>()
            .one(&self.db)
            .await?
            .and_then(|t| t.total_bytes)
            .unwrap_or(0);

        Ok(UsageCounters {
            camera_count: i64::try_from(camera_count).unwrap_or(i64::MAX),
            caregiver_count: i64::try_from(caregiver_count).unwrap_or(i64::MAX),
            storage_used_gb: total / GIB + i64::from(total % GIB > 0),
            site_count: i64::try_from(site_count).unwrap_or(i64::MAX),
        })
    }
}
