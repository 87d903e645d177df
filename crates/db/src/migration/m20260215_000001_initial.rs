//! Initial database migration.
//!
//! Creates the enums, billing tables, usage-owning tables, indexes and
//! triggers for the subscription and entitlement engine.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: PLAN CATALOG
        // ============================================================
        db.execute_unprepared(PLAN_VERSIONS_SQL).await?;

        // ============================================================
        // PART 3: SUBSCRIPTIONS & PAYMENTS
        // ============================================================
        db.execute_unprepared(SUBSCRIPTIONS_SQL).await?;
        db.execute_unprepared(PAYMENTS_SQL).await?;
        db.execute_unprepared(IDEMPOTENCY_KEYS_SQL).await?;

        // ============================================================
        // PART 4: QUOTA STATE
        // ============================================================
        db.execute_unprepared(QUOTA_OVERRIDES_SQL).await?;
        db.execute_unprepared(QUOTA_GRACE_SQL).await?;

        // ============================================================
        // PART 5: AUDIT TRAIL
        // ============================================================
        db.execute_unprepared(AUDIT_LOGS_SQL).await?;

        // ============================================================
        // PART 6: USAGE-OWNING TABLES (counted live at admission)
        // ============================================================
        db.execute_unprepared(USAGE_TABLES_SQL).await?;

        // ============================================================
        // PART 7: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
-- Plan version lifecycle
CREATE TYPE plan_state AS ENUM (
    'draft',
    'active',
    'deprecated',
    'archived'
);

-- Subscription lifecycle
CREATE TYPE subscription_status AS ENUM (
    'trialing',
    'active',
    'paused',
    'past_due',
    'cancelled'
);

-- Payment lifecycle; 'pending' is the only non-terminal state
CREATE TYPE payment_status AS ENUM (
    'pending',
    'paid',
    'failed',
    'cancelled',
    'refunded'
);

-- Billing cadence
CREATE TYPE billing_period AS ENUM ('monthly', 'none');

-- Billing timing
CREATE TYPE billing_type AS ENUM ('prepaid', 'postpaid');
";

const PLAN_VERSIONS_SQL: &str = r"
CREATE TABLE plan_versions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    code VARCHAR(64) NOT NULL,
    version VARCHAR(32) NOT NULL,
    tier INTEGER NOT NULL,
    price_minor BIGINT NOT NULL CHECK (price_minor >= 0),
    currency VARCHAR(3) NOT NULL,
    billing_period billing_period NOT NULL DEFAULT 'monthly',
    camera_quota BIGINT,
    retention_days BIGINT NOT NULL,
    caregiver_seats BIGINT,
    sites BIGINT,
    state plan_state NOT NULL DEFAULT 'draft',
    is_current BOOLEAN NOT NULL DEFAULT FALSE,
    effective_from TIMESTAMPTZ NOT NULL,
    effective_to TIMESTAMPTZ,
    successor_code VARCHAR(64),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_plan_versions_code_version UNIQUE (code, version),
    CONSTRAINT ck_plan_versions_effective_range
        CHECK (effective_to IS NULL OR effective_to > effective_from)
);

-- At most one current version per plan code
CREATE UNIQUE INDEX idx_plan_versions_single_current
    ON plan_versions (code) WHERE is_current;

CREATE INDEX idx_plan_versions_code ON plan_versions (code);
";

const SUBSCRIPTIONS_SQL: &str = r"
CREATE TABLE subscriptions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    plan_code VARCHAR(64) NOT NULL,
    plan_version_id UUID NOT NULL REFERENCES plan_versions(id),
    status subscription_status NOT NULL DEFAULT 'active',
    current_period_start TIMESTAMPTZ NOT NULL,
    current_period_end TIMESTAMPTZ NOT NULL,
    billing_period billing_period NOT NULL DEFAULT 'monthly',
    billing_type billing_type NOT NULL DEFAULT 'prepaid',
    auto_renew BOOLEAN NOT NULL DEFAULT FALSE,
    last_payment_at TIMESTAMPTZ,
    pending_downgrade_code VARCHAR(64),
    pending_downgrade_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- At most one live subscription per user; cancelled rows are history
CREATE UNIQUE INDEX idx_subscriptions_one_live_per_user
    ON subscriptions (user_id) WHERE status <> 'cancelled';

CREATE INDEX idx_subscriptions_user ON subscriptions (user_id);
";

const PAYMENTS_SQL: &str = r"
CREATE TABLE payments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    amount_minor BIGINT NOT NULL CHECK (amount_minor >= 0),
    currency VARCHAR(3) NOT NULL,
    provider VARCHAR(32) NOT NULL,
    status payment_status NOT NULL DEFAULT 'pending',
    delivery_data JSONB NOT NULL,
    idempotency_key VARCHAR(128) UNIQUE,
    provider_ref VARCHAR(64) NOT NULL UNIQUE,
    provider_response_code VARCHAR(8),
    paid_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_payments_user ON payments (user_id);
CREATE INDEX idx_payments_pending_created
    ON payments (created_at) WHERE status = 'pending';
";

const IDEMPOTENCY_KEYS_SQL: &str = r"
CREATE TABLE idempotency_keys (
    key VARCHAR(128) PRIMARY KEY,
    operation_fingerprint VARCHAR(64) NOT NULL,
    result_snapshot JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    expires_at TIMESTAMPTZ NOT NULL
);
";

const QUOTA_OVERRIDES_SQL: &str = r"
CREATE TABLE quota_overrides (
    user_id UUID PRIMARY KEY,
    camera_quota BIGINT,
    caregiver_seats BIGINT,
    storage_gb BIGINT,
    sites BIGINT,
    granted_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const QUOTA_GRACE_SQL: &str = r"
CREATE TABLE quota_grace (
    user_id UUID NOT NULL,
    resource VARCHAR(16) NOT NULL,
    exceeded_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    PRIMARY KEY (user_id, resource)
);
";

const AUDIT_LOGS_SQL: &str = r"
CREATE TABLE audit_logs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    actor_id UUID,
    action VARCHAR(64) NOT NULL,
    resource VARCHAR(64) NOT NULL,
    severity VARCHAR(16) NOT NULL,
    detail JSONB NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_audit_logs_actor ON audit_logs (actor_id);
CREATE INDEX idx_audit_logs_created ON audit_logs (created_at);
";

const USAGE_TABLES_SQL: &str = r"
-- Owned by the monitoring/media services; the entitlement engine only
-- counts these live at admission time.
CREATE TABLE cameras (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    label VARCHAR(128) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX idx_cameras_user ON cameras (user_id);

CREATE TABLE caregiver_links (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    caregiver_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_caregiver_links UNIQUE (user_id, caregiver_id)
);
CREATE INDEX idx_caregiver_links_user ON caregiver_links (user_id);

CREATE TABLE sites_rooms (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    name VARCHAR(128) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX idx_sites_rooms_user ON sites_rooms (user_id);

CREATE TABLE storage_objects (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    size_bytes BIGINT NOT NULL CHECK (size_bytes >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX idx_storage_objects_user ON storage_objects (user_id);
";

const TRIGGERS_SQL: &str = r"
CREATE OR REPLACE FUNCTION set_updated_at()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = NOW();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_plan_versions_updated_at
    BEFORE UPDATE ON plan_versions
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();

CREATE TRIGGER trg_subscriptions_updated_at
    BEFORE UPDATE ON subscriptions
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();

CREATE TRIGGER trg_payments_updated_at
    BEFORE UPDATE ON payments
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();

CREATE TRIGGER trg_quota_overrides_updated_at
    BEFORE UPDATE ON quota_overrides
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS storage_objects CASCADE;
DROP TABLE IF EXISTS sites_rooms CASCADE;
DROP TABLE IF EXISTS caregiver_links CASCADE;
DROP TABLE IF EXISTS cameras CASCADE;
DROP TABLE IF EXISTS audit_logs CASCADE;
DROP TABLE IF EXISTS quota_grace CASCADE;
DROP TABLE IF EXISTS quota_overrides CASCADE;
DROP TABLE IF EXISTS idempotency_keys CASCADE;
DROP TABLE IF EXISTS payments CASCADE;
DROP TABLE IF EXISTS subscriptions CASCADE;
DROP TABLE IF EXISTS plan_versions CASCADE;

DROP FUNCTION IF EXISTS set_updated_at CASCADE;

DROP TYPE IF EXISTS billing_type;
DROP TYPE IF EXISTS billing_period;
DROP TYPE IF EXISTS payment_status;
DROP TYPE IF EXISTS subscription_status;
DROP TYPE IF EXISTS plan_state;
";
