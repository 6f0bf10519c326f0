//! PostgreSQL storage for the Coffer ledger.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Repositories implementing the `coffer_core::storage` contracts
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;

mod error;

use std::sync::Arc;

use coffer_core::storage::LedgerDeps;
use coffer_shared::{DatabaseConfig, LedgerConfig};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

pub use repositories::{
    BalanceLogRepository, BalanceRepository, CachedExchangeRates, ExchangeRateRepository,
    ManualFundRepository, TaxonomyRepository, UserRepository,
};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Establishes a pooled connection sized by `config`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Wires every ledger collaborator to PostgreSQL.
///
/// Exchange rates go through a cache sized and aged by `config`; funding
/// limits come from `admin_funding_limits`. No deposit notifier is set.
#[must_use]
pub fn ledger_deps(db: &DatabaseConnection, config: &LedgerConfig) -> LedgerDeps {
    let users = Arc::new(UserRepository::new(db.clone()));
    let rates = CachedExchangeRates::new(
        Arc::new(ExchangeRateRepository::new(db.clone())),
        config.rate_cache_capacity,
        config.rate_cache_ttl(),
    );
    LedgerDeps {
        balances: Arc::new(BalanceRepository::new(db.clone())),
        logs: Arc::new(BalanceLogRepository::new(db.clone())),
        taxonomy: Arc::new(TaxonomyRepository::new(db.clone())),
        rates: Arc::new(rates),
        users: users.clone(),
        manual_funds: Arc::new(ManualFundRepository::new(db.clone())),
        funding_limits: Some(users),
        notifier: None,
    }
}
