//! Database enum mappings.
//!
//! Each active enum mirrors a Postgres enum type created by the initial
//! migration and converts to/from its `vigil-core` counterpart so
//! repositories can hand the pure rules their own types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use vigil_core::lifecycle;
use vigil_core::plan::VersionState;

/// Lifecycle state of a plan version.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "plan_state")]
pub enum PlanState {
    /// Editable, invisible to subscribers.
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Published; may be the current version for sign-ups.
    #[sea_orm(string_value = "active")]
    Active,
    /// Hidden from new sign-ups.
    #[sea_orm(string_value = "deprecated")]
    Deprecated,
    /// Subscribers migrate to the successor at next renewal.
    #[sea_orm(string_value = "archived")]
    Archived,
}

impl From<PlanState> for VersionState {
    fn from(state: PlanState) -> Self {
        match state {
            PlanState::Draft => Self::Draft,
            PlanState::Active => Self::Active,
            PlanState::Deprecated => Self::Deprecated,
            PlanState::Archived => Self::Archived,
        }
    }
}

impl From<VersionState> for PlanState {
    fn from(state: VersionState) -> Self {
        match state {
            VersionState::Draft => Self::Draft,
            VersionState::Active => Self::Active,
            VersionState::Deprecated => Self::Deprecated,
            VersionState::Archived => Self::Archived,
        }
    }
}

/// Subscription status.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "subscription_status")]
pub enum SubscriptionStatus {
    /// In a free trial window.
    #[sea_orm(string_value = "trialing")]
    Trialing,
    /// Paid-up (or free-tier) and entitled.
    #[sea_orm(string_value = "active")]
    Active,
    /// Temporarily suspended.
    #[sea_orm(string_value = "paused")]
    Paused,
    /// Period lapsed without payment.
    #[sea_orm(string_value = "past_due")]
    PastDue,
    /// Terminal.
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl From<SubscriptionStatus> for lifecycle::SubscriptionStatus {
    fn from(status: SubscriptionStatus) -> Self {
        match status {
            SubscriptionStatus::Trialing => Self::Trialing,
            SubscriptionStatus::Active => Self::Active,
            SubscriptionStatus::Paused => Self::Paused,
            SubscriptionStatus::PastDue => Self::PastDue,
            SubscriptionStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<lifecycle::SubscriptionStatus> for SubscriptionStatus {
    fn from(status: lifecycle::SubscriptionStatus) -> Self {
        match status {
            lifecycle::SubscriptionStatus::Trialing => Self::Trialing,
            lifecycle::SubscriptionStatus::Active => Self::Active,
            lifecycle::SubscriptionStatus::Paused => Self::Paused,
            lifecycle::SubscriptionStatus::PastDue => Self::PastDue,
            lifecycle::SubscriptionStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Payment status. `pending` is the only non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "payment_status")]
pub enum PaymentStatus {
    /// Awaiting provider confirmation.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Confirmed by the provider.
    #[sea_orm(string_value = "paid")]
    Paid,
    /// Rejected by the provider.
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Cancelled before confirmation.
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    /// Refunded through the manual admin path.
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl PaymentStatus {
    /// Whether the payment can still change state.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Billing period.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "billing_period")]
pub enum BillingPeriod {
    /// Renews every calendar month.
    #[sea_orm(string_value = "monthly")]
    Monthly,
    /// No recurring billing (free tier).
    #[sea_orm(string_value = "none")]
    None,
}

impl From<BillingPeriod> for lifecycle::BillingPeriod {
    fn from(period: BillingPeriod) -> Self {
        match period {
            BillingPeriod::Monthly => Self::Monthly,
            BillingPeriod::None => Self::None,
        }
    }
}

impl From<lifecycle::BillingPeriod> for BillingPeriod {
    fn from(period: lifecycle::BillingPeriod) -> Self {
        match period {
            lifecycle::BillingPeriod::Monthly => Self::Monthly,
            lifecycle::BillingPeriod::None => Self::None,
        }
    }
}

/// Billing type.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "billing_type")]
pub enum BillingType {
    /// Paid at period start.
    #[sea_orm(string_value = "prepaid")]
    Prepaid,
    /// Paid at period end.
    #[sea_orm(string_value = "postpaid")]
    Postpaid,
}

impl From<BillingType> for lifecycle::BillingType {
    fn from(ty: BillingType) -> Self {
        match ty {
            BillingType::Prepaid => Self::Prepaid,
            BillingType::Postpaid => Self::Postpaid,
        }
    }
}

impl From<lifecycle::BillingType> for BillingType {
    fn from(ty: lifecycle::BillingType) -> Self {
        match ty {
            lifecycle::BillingType::Prepaid => Self::Prepaid,
            lifecycle::BillingType::Postpaid => Self::Postpaid,
        }
    }
}
