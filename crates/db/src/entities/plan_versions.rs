//! `SeaORM` Entity for the plan_versions table.
//!
//! A row is one immutable version of a plan; the partial unique index on
//! `(code) WHERE is_current` guarantees at most one current version per code.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{BillingPeriod, PlanState};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "plan_versions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub code: String,
    pub version: String,
    pub tier: i32,
    pub price_minor: i64,
    pub currency: String,
    pub billing_period: BillingPeriod,
    pub camera_quota: Option<i64>,
    pub retention_days: i64,
    pub caregiver_seats: Option<i64>,
    pub sites: Option<i64>,
    pub state: PlanState,
    pub is_current: bool,
    pub effective_from: DateTimeWithTimeZone,
    pub effective_to: Option<DateTimeWithTimeZone>,
    pub successor_code: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscriptions::Entity")]
    Subscriptions,
}

impl Related<super::subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
