//! `SeaORM` entity definitions.

pub mod audit_logs;
pub mod cameras;
pub mod caregiver_links;
pub mod idempotency_keys;
pub mod payments;
pub mod plan_versions;
pub mod quota_grace;
pub mod quota_overrides;
pub mod sea_orm_active_enums;
pub mod sites_rooms;
pub mod storage_objects;
pub mod subscriptions;
