//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the
//! application.

pub mod audit;
pub mod idempotency;
pub mod payment;
pub mod plan;
pub mod quota;
pub mod subscription;
pub mod usage;

pub use audit::{AuditEntry, AuditRepository, AuditSeverity};
pub use idempotency::{IdempotencyRepository, IdempotencyStart, fingerprint};
pub use payment::{CallbackOutcome, PROVIDER_VNPAY, PaymentError, PaymentRepository};
pub use plan::{CatalogError, CreateVersionInput, PlanRepository};
pub use quota::QuotaRepository;
pub use subscription::{SubscriptionError, SubscriptionRepository, UpgradeDecision};
pub use usage::UsageRepository;
