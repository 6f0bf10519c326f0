//! Database seeder for Coffer development and testing.
//!
//! Applies pending migrations, then seeds the operational taxonomy, a demo
//! set of exchange rates, a demo player and a demo administrator with a
//! funding limit. Every step is idempotent.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::{Context, anyhow};
use coffer_core::ledger::TaxonomyResolver;
use coffer_core::ledger::types::{groups, op_types};
use coffer_db::migration::{Migrator, MigratorTrait};
use coffer_db::{ExchangeRateRepository, TaxonomyRepository, UserRepository};
use coffer_shared::AppConfig;
use coffer_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use sea_orm_migration::sea_orm::DatabaseConnection;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Operational (group, type) pairs known up front.
const TAXONOMY: &[(&str, &str)] = &[
    (groups::DEPOSIT, "card"),
    (groups::DEPOSIT, "bank_transfer"),
    (groups::DEPOSIT, "crypto"),
    (groups::WITHDRAWAL, "card"),
    (groups::WITHDRAWAL, "bank_transfer"),
    (groups::TRANSFER, op_types::ADD_FUND),
    (groups::TRANSFER, op_types::REMOVE_FUND),
    (groups::TRANSFER, op_types::INTERNAL_TRANSACTION),
    (groups::FUND, op_types::ADD_FUND),
];

/// Demo rates as (from, to, rate with four decimals).
const RATES: &[(&str, &str, i64)] = &[
    ("USD", "EUR", 9_200),
    ("EUR", "USD", 10_870),
    ("USD", "GBP", 7_900),
    ("GBP", "USD", 12_658),
    ("USD", "JPY", 1_496_500),
    ("JPY", "USD", 67),
    ("USD", "P", 1_000_000),
];

const DEMO_PLAYER: &str = "demo-player";
const DEMO_ADMIN: &str = "demo-admin";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coffer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    info!("Connecting to database...");
    let db = coffer_db::connect_with(&config.database).await?;
    Migrator::up(&db, None).await?;

    info!("Seeding operational taxonomy...");
    seed_taxonomy(&db).await?;

    info!("Seeding exchange rates...");
    seed_exchange_rates(&db).await?;

    info!("Seeding demo users...");
    seed_users(&db).await?;

    info!("Seeding complete");
    Ok(())
}

async fn seed_taxonomy(db: &DatabaseConnection) -> anyhow::Result<()> {
    let resolver = TaxonomyResolver::new(Arc::new(TaxonomyRepository::new(db.clone())));
    for (group, op_type) in TAXONOMY {
        let tag = resolver.get_or_create(group, op_type).await?;
        info!(group = %tag.group_name, op_type = %tag.type_name, "  taxonomy entry ready");
    }
    Ok(())
}

async fn seed_exchange_rates(db: &DatabaseConnection) -> anyhow::Result<()> {
    let rates = ExchangeRateRepository::new(db.clone());
    for &(from, to, scaled) in RATES {
        let from = CurrencyCode::parse(from).map_err(|code| anyhow!("bad currency {code}"))?;
        let to = CurrencyCode::parse(to).map_err(|code| anyhow!("bad currency {code}"))?;
        rates.upsert_rate(&from, &to, Decimal::new(scaled, 4)).await?;
    }
    Ok(())
}

async fn seed_users(db: &DatabaseConnection) -> anyhow::Result<()> {
    let users = UserRepository::new(db.clone());
    let player = users.ensure_user(DEMO_PLAYER).await?;
    let admin = users.ensure_user(DEMO_ADMIN).await?;
    users
        .set_funding_limit(admin.id, Some(Decimal::new(1_000, 0)))
        .await?;
    info!(player_id = %player.id, admin_id = %admin.id, "  demo users ready");
    Ok(())
}
