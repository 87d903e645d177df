//! Audit trail repository.
//!
//! Handlers call [`AuditRepository::record`] explicitly after a
//! successful domain mutation; there is no interception layer.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use uuid::Uuid;

use crate::entities::audit_logs;

/// Severity of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    /// Routine domain mutation.
    Info,
    /// Unusual but handled (quota overrun, rejected callback).
    Warning,
    /// Needs operator attention.
    Critical,
}

impl AuditSeverity {
    /// Stable string stored in the log row.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Acting user; `None` for provider callbacks and system actions.
    pub actor_id: Option<Uuid>,
    /// Verb, e.g. `plan.upgrade`.
    pub action: String,
    /// Affected resource, e.g. `subscription`.
    pub resource: String,
    /// Severity.
    pub severity: AuditSeverity,
    /// Structured context.
    pub detail: serde_json::Value,
}

/// Repository for writing audit log rows.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    db: DatabaseConnection,
}

impl AuditRepository {
    /// Creates a new audit repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Records one entry. Failures are surfaced to the caller, which
    /// typically logs them without failing the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn record(&self, entry: AuditEntry) -> Result<(), DbErr> {
        let row = audit_logs::ActiveModel {
            id: Set(Uuid::new_v4()),
            actor_id: Set(entry.actor_id),
            action: Set(entry.action),
            resource: Set(entry.resource),
            severity: Set(entry.severity.as_str().to_string()),
            detail: Set(entry.detail),
            created_at: Set(Utc::now().into()),
        };

        row.insert(&self.db).await?;

        Ok(())
    }
}
