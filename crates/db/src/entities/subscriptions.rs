//! `SeaORM` Entity for the subscriptions table.
//!
//! `plan_version_id` is a snapshot reference: catalog edits never change
//! an already-paid period. The partial unique index on `(user_id) WHERE
//! status <> 'cancelled'` allows at most one live subscription per user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{BillingPeriod, BillingType, SubscriptionStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_code: String,
    pub plan_version_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTimeWithTimeZone,
    pub current_period_end: DateTimeWithTimeZone,
    pub billing_period: BillingPeriod,
    pub billing_type: BillingType,
    pub auto_renew: bool,
    pub last_payment_at: Option<DateTimeWithTimeZone>,
    pub pending_downgrade_code: Option<String>,
    pub pending_downgrade_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::plan_versions::Entity",
        from = "Column::PlanVersionId",
        to = "super::plan_versions::Column::Id"
    )]
    PlanVersions,
}

impl Related<super::plan_versions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlanVersions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
