//! `SeaORM` entity definitions for the ledger schema.

pub mod prelude;

pub mod admin_funding_limits;
pub mod balance_logs;
pub mod balances;
pub mod exchange_rates;
pub mod manual_funds;
pub mod operational_group_types;
pub mod operational_groups;
pub mod users;
