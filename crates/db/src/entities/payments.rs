//! `SeaORM` Entity for the payments table.
//!
//! `provider_ref` is the transaction reference sent to the payment
//! provider (`vnp_TxnRef`) and is unique; `delivery_data` records what a
//! successful payment unlocks.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::PaymentStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub delivery_data: Json,
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,
    #[sea_orm(unique)]
    pub provider_ref: String,
    pub provider_response_code: Option<String>,
    pub paid_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
