//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Repository abstractions for data access
//! - Database migrations
//!
//! All transactional invariants live here: subscription row locks,
//! payment terminal-state CAS, idempotency insert-if-absent, and the
//! single-current-version guarantee of the plan catalog.

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::{
    AuditRepository, IdempotencyRepository, PaymentRepository, PlanRepository, QuotaRepository,
    SubscriptionRepository, UsageRepository,
};

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}
