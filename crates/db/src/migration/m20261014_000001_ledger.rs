//! Ledger schema migration.
//!
//! Creates users, balances, the audit log, the operational taxonomy,
//! exchange rates and manual fund records. The unique keys here are the ones
//! the ledger relies on for idempotency and get-or-create races.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: USERS
        // ============================================================
        db.execute_unprepared(USERS_SQL).await?;
        db.execute_unprepared(ADMIN_FUNDING_LIMITS_SQL).await?;

        // ============================================================
        // PART 2: OPERATIONAL TAXONOMY
        // ============================================================
        db.execute_unprepared(OPERATIONAL_GROUPS_SQL).await?;
        db.execute_unprepared(OPERATIONAL_GROUP_TYPES_SQL).await?;

        // ============================================================
        // PART 3: BALANCES & AUDIT LOG
        // ============================================================
        db.execute_unprepared(BALANCES_SQL).await?;
        db.execute_unprepared(BALANCE_LOGS_SQL).await?;

        // ============================================================
        // PART 4: EXCHANGE RATES
        // ============================================================
        db.execute_unprepared(EXCHANGE_RATES_SQL).await?;

        // ============================================================
        // PART 5: MANUAL FUNDS
        // ============================================================
        db.execute_unprepared(MANUAL_FUNDS_SQL).await?;

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

const USERS_SQL: &str = r"
CREATE TABLE users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    username VARCHAR(255) NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const ADMIN_FUNDING_LIMITS_SQL: &str = r"
CREATE TABLE admin_funding_limits (
    admin_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    -- NULL means unlimited
    limit_amount NUMERIC(20, 4) CHECK (limit_amount IS NULL OR limit_amount >= 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const OPERATIONAL_GROUPS_SQL: &str = r"
CREATE TABLE operational_groups (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(100) NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const OPERATIONAL_GROUP_TYPES_SQL: &str = r"
CREATE TABLE operational_group_types (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    group_id UUID NOT NULL REFERENCES operational_groups(id) ON DELETE RESTRICT,
    name VARCHAR(100) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT uq_operational_group_types_group_name UNIQUE (group_id, name)
);
";

const BALANCES_SQL: &str = r"
CREATE TABLE balances (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    currency_code VARCHAR(8) NOT NULL,
    real_money NUMERIC(20, 4) NOT NULL DEFAULT 0,
    bonus_money NUMERIC(20, 4) NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT uq_balances_user_currency UNIQUE (user_id, currency_code),
    CONSTRAINT chk_balances_non_negative CHECK (real_money >= 0 AND bonus_money >= 0)
);
";

const BALANCE_LOGS_SQL: &str = r"
CREATE TABLE balance_logs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    component VARCHAR(16) NOT NULL CHECK (component IN ('real_money', 'bonus_money')),
    currency_code VARCHAR(8) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    change_amount NUMERIC(20, 4) NOT NULL,
    operational_group_id UUID NOT NULL REFERENCES operational_groups(id),
    operational_type_id UUID NOT NULL REFERENCES operational_group_types(id),
    balance_after_update NUMERIC(20, 4),
    -- Idempotency key for provider-driven credits
    transaction_id VARCHAR(255) UNIQUE,
    status VARCHAR(16) NOT NULL DEFAULT 'COMPLETED',
    timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_balance_logs_user_time ON balance_logs(user_id, timestamp DESC);
CREATE INDEX idx_balance_logs_group_type ON balance_logs(operational_group_id, operational_type_id);
";

const EXCHANGE_RATES_SQL: &str = r"
CREATE TABLE exchange_rates (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    currency_from VARCHAR(8) NOT NULL,
    currency_to VARCHAR(8) NOT NULL,
    rate NUMERIC(20, 10) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT uq_exchange_rates_pair UNIQUE (currency_from, currency_to),
    CONSTRAINT chk_exchange_rates_distinct CHECK (currency_from <> currency_to)
);
";

const MANUAL_FUNDS_SQL: &str = r"
CREATE TABLE manual_funds (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    admin_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    -- NULL when the audit entry could not be written
    transaction_id VARCHAR(255),
    fund_type VARCHAR(16) NOT NULL CHECK (fund_type IN ('add_fund', 'remove_fund')),
    amount NUMERIC(20, 4) NOT NULL CHECK (amount > 0),
    reason TEXT NOT NULL,
    currency_code VARCHAR(8) NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_manual_funds_user_time ON manual_funds(user_id, created_at DESC);
CREATE INDEX idx_manual_funds_admin_time ON manual_funds(admin_id, created_at DESC);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS manual_funds CASCADE;
DROP TABLE IF EXISTS exchange_rates CASCADE;
DROP TABLE IF EXISTS balance_logs CASCADE;
DROP TABLE IF EXISTS balances CASCADE;
DROP TABLE IF EXISTS operational_group_types CASCADE;
DROP TABLE IF EXISTS operational_groups CASCADE;
DROP TABLE IF EXISTS admin_funding_limits CASCADE;
DROP TABLE IF EXISTS users CASCADE;
";
