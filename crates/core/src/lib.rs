//! Core ledger logic for Coffer.
//!
//! This crate contains the balance ledger with ZERO web or database
//! dependencies. Persistence is reached only through the traits in
//! [`storage`]; `coffer-db` implements them on PostgreSQL.
//!
//! # Modules
//!
//! - `ledger` - Balances, audit log, exchange, wallet credit, manual funds
//! - `currency` - Currency validation, rounding and exchange rates
//! - `storage` - Storage contracts and the in-memory backend

pub mod currency;
pub mod ledger;
pub mod storage;
