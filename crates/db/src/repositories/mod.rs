//! Repository implementations of the ledger storage contracts.
//!
//! Each repository wraps a `DatabaseConnection` and implements one or more
//! traits from `coffer_core::storage`. Every write is a single statement, so
//! the ledger's single-row atomicity assumption holds on PostgreSQL.

pub mod balance;
pub mod balance_log;
pub mod exchange_rate;
pub mod manual_fund;
pub mod taxonomy;
pub mod user;

pub use balance::BalanceRepository;
pub use balance_log::BalanceLogRepository;
pub use exchange_rate::{CachedExchangeRates, ExchangeRateRepository};
pub use manual_fund::ManualFundRepository;
pub use taxonomy::TaxonomyRepository;
pub use user::UserRepository;

use coffer_core::ledger::SortDirection;
use sea_orm::Order;

const fn sort_order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}
