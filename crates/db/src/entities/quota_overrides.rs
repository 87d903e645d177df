//! `SeaORM` Entity for the quota_overrides table.
//!
//! Per-user admin grants. Null fields defer to the plan quotas.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "quota_overrides")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    pub camera_quota: Option<i64>,
    pub caregiver_seats: Option<i64>,
    pub storage_gb: Option<i64>,
    pub sites: Option<i64>,
    pub granted_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
