//! Quota evaluation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_shared::config::QuotaConfig;

use crate::plan::PlanQuotas;

/// Resource kinds subject to quota enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Monitoring cameras.
    Camera,
    /// Caregiver seats.
    Caregiver,
    /// Media storage (GB).
    Storage,
    /// Monitored sites/rooms.
    Site,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Camera => write!(f, "camera"),
            Self::Caregiver => write!(f, "caregiver"),
            Self::Storage => write!(f, "storage"),
            Self::Site => write!(f, "site"),
        }
    }
}

/// Action being admitted against a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAction {
    /// Provisioning one more unit of the resource.
    Add,
    /// Using what already exists.
    Use,
}

/// Live usage counters, recomputed from the owning tables at check time.
///
/// Hard-cap admission never trusts a cached counter; these are current
/// truth at the moment of the decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Cameras registered.
    pub camera_count: i64,
    /// Caregivers linked.
    pub caregiver_count: i64,
    /// Storage used in whole GB.
    pub storage_used_gb: i64,
    /// Sites/rooms configured.
    pub site_count: i64,
}

impl UsageCounters {
    /// Returns the counter for one resource kind.
    #[must_use]
    pub const fn get(&self, resource: ResourceKind) -> i64 {
        match resource {
            ResourceKind::Camera => self.camera_count,
            ResourceKind::Caregiver => self.caregiver_count,
            ResourceKind::Storage => self.storage_used_gb,
            ResourceKind::Site => self.site_count,
        }
    }
}

/// Admin-granted per-user quota overrides. `None` fields defer to the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaOverrides {
    /// Camera quota override.
    pub camera_quota: Option<i64>,
    /// Caregiver seat override.
    pub caregiver_seats: Option<i64>,
    /// Storage quota override in GB.
    pub storage_gb: Option<i64>,
    /// Site quota override.
    pub sites: Option<i64>,
}

/// Effective quotas after the override → plan → fallback resolution chain.
/// `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveQuotas {
    /// Effective camera quota.
    pub camera: Option<i64>,
    /// Effective caregiver seats.
    pub caregiver: Option<i64>,
    /// Effective storage quota in GB.
    pub storage_gb: Option<i64>,
    /// Effective site quota.
    pub sites: Option<i64>,
}

impl EffectiveQuotas {
    /// Resolves effective quotas: override wins over plan default, plan
    /// default wins over hard-coded fallback. A plan that defines a field
    /// as `None` grants unlimited; the fallback only applies when no plan
    /// is known at all. The plan does not define a storage quota, so
    /// storage resolves override → fallback.
    #[must_use]
    pub fn resolve(
        overrides: Option<&QuotaOverrides>,
        plan: Option<&PlanQuotas>,
        fallback: &QuotaConfig,
    ) -> Self {
        let ov = overrides.copied().unwrap_or_default();

        let pick = |ov_field: Option<i64>, plan_field: Option<Option<i64>>, fb: i64| {
            if ov_field.is_some() {
                return ov_field;
            }
            plan_field.map_or(Some(fb), |defined| defined)
        };

        Self {
            camera: pick(
                ov.camera_quota,
                plan.map(|p| p.camera_quota),
                fallback.fallback_camera_quota,
            ),
            caregiver: pick(
                ov.caregiver_seats,
                plan.map(|p| p.caregiver_seats),
                fallback.fallback_caregiver_seats,
            ),
            storage_gb: ov.storage_gb.or(Some(fallback.fallback_storage_gb)),
            sites: pick(ov.sites, plan.map(|p| p.sites), fallback.fallback_sites),
        }
    }

    /// Returns the effective quota for one resource kind. `None` = unlimited.
    #[must_use]
    pub const fn get(&self, resource: ResourceKind) -> Option<i64> {
        match resource {
            ResourceKind::Camera => self.camera,
            ResourceKind::Caregiver => self.caregiver,
            ResourceKind::Storage => self.storage_gb,
            ResourceKind::Site => self.sites,
        }
    }
}

/// Per-(user, resource) grace tracking state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceState {
    /// When usage first exceeded the quota; `None` if not currently over.
    pub exceeded_at: Option<DateTime<Utc>>,
}

/// Outcome of an entitlement check that did not hard-deny.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Entitlement {
    /// Comfortably within quota.
    Allowed,
    /// At or above the soft-cap threshold; allowed with a warning.
    SoftWarn {
        /// Human-readable warning for the client.
        warning: String,
    },
    /// Over quota but inside the grace window.
    Grace {
        /// Whole days left before the hard cap applies.
        days_remaining: i64,
    },
}

/// Named policy for the admin quota-override endpoint.
///
/// The endpoint currently acknowledges without writing; tests assert this
/// enum rather than response prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// Acknowledge and drop the write.
    Disabled,
    /// Persist the override.
    Enabled,
}

impl OverridePolicy {
    /// Whether override writes are persisted.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}
