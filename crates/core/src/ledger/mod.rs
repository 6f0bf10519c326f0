//! Multi-currency balance ledger.
//!
//! This module implements the ledger operations:
//! - Deposit, withdraw and tagged balance updates
//! - Currency exchange between a user's balances
//! - Idempotent wallet credits keyed by payment reference
//! - Administrator manual funds with compensation
//! - Operational taxonomy get-or-create
//! - Balance, audit log and manual fund queries

pub mod error;
pub mod lock;
pub mod saga;
pub mod service;
pub mod taxonomy;
pub mod types;

mod exchange;
mod manual_fund;
mod queries;
mod wallet;

#[cfg(test)]
mod service_props;
#[cfg(test)]
mod tests;

pub use error::{ErrorKind, LedgerError};
pub use lock::{UserLockGuard, UserLocks};
pub use saga::{OperationSaga, SagaState, SagaStep};
pub use service::LedgerService;
pub use taxonomy::TaxonomyResolver;
pub use types::{
    Balance, BalanceChangeRequest, BalanceLog, BalanceLogFilter, BalanceLogQuery, BalanceLogSort,
    BalanceUpdate, Component, CreditWalletOutcome, CreditWalletRequest, ExchangeOutcome,
    ExchangeRequest, LogStatus, ManualFundFilter, ManualFundOutcome, ManualFundQuery,
    ManualFundRecord, ManualFundRequest, ManualFundSort, ManualFundType, OperationalGroup,
    OperationalGroupType, OperationalTag, SortDirection, UpdateBalanceRequest, UpdateOutcome,
    UserAccount,
};
