//! Storage contracts consumed by the ledger.
//!
//! The ledger assumes single-row atomic writes and nothing more: no
//! compare-and-swap and no multi-row transactions. Consistency across rows
//! comes from the per-user lock and explicit compensation in the service.
//!
//! Backends implement these traits; [`memory::InMemoryStore`] implements all
//! of them for tests and tools, `coffer-db` implements them on PostgreSQL.

pub mod error;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use coffer_shared::types::{
    BalanceLogId, CurrencyCode, OperationalGroupId, OperationalTypeId, PageRequest, UserId,
};
use rust_decimal::Decimal;

pub use error::StorageError;
pub use memory::InMemoryStore;

use crate::currency::ExchangeRate;
use crate::ledger::types::{
    Balance, BalanceLog, BalanceLogFilter, Component, ManualFundFilter, ManualFundRecord,
    OperationalGroup, OperationalGroupType, UserAccount,
};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One balance row per (user, currency).
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Returns the balance of `user_id` in `currency`, if any.
    async fn get_balance(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> StorageResult<Option<Balance>>;

    /// Returns every balance of `user_id`.
    async fn list_balances(&self, user_id: UserId) -> StorageResult<Vec<Balance>>;

    /// Inserts a balance; `AlreadyExists` if (user, currency) is taken.
    async fn create_balance(&self, balance: Balance) -> StorageResult<Balance>;

    /// Atomically sets one component of an existing balance to `value`.
    ///
    /// `NotFound` if the row does not exist.
    async fn set_amount(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
        component: Component,
        value: Decimal,
    ) -> StorageResult<Balance>;
}

/// Append-only audit trail.
#[async_trait]
pub trait BalanceLogStore: Send + Sync {
    /// Appends an entry; `AlreadyExists` if its transaction id is taken.
    async fn append_log(&self, log: BalanceLog) -> StorageResult<BalanceLog>;

    /// Returns the entry with `id`, if any.
    async fn get_log(&self, id: BalanceLogId) -> StorageResult<Option<BalanceLog>>;

    /// Returns the entry whose transaction id is `transaction_id`, if any.
    async fn get_log_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StorageResult<Option<BalanceLog>>;

    /// Deletes an entry. Used only by compensation.
    async fn delete_log(&self, id: BalanceLogId) -> StorageResult<()>;

    /// Returns one page of matching entries in `filter.sort` order, and the total match count.
    async fn query_logs(
        &self,
        filter: &BalanceLogFilter,
        page: PageRequest,
    ) -> StorageResult<(Vec<BalanceLog>, u64)>;
}

/// Operational groups and types.
///
/// Group names and (group, type name) pairs are unique; a losing concurrent
/// creator gets `AlreadyExists`.
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    /// Returns the group named `name`, if any.
    async fn get_group_by_name(&self, name: &str) -> StorageResult<Option<OperationalGroup>>;

    /// Returns the group with `id`, if any.
    async fn get_group(&self, id: OperationalGroupId) -> StorageResult<Option<OperationalGroup>>;

    /// Inserts a group.
    async fn create_group(&self, group: OperationalGroup) -> StorageResult<OperationalGroup>;

    /// Returns every group ordered by name.
    async fn list_groups(&self) -> StorageResult<Vec<OperationalGroup>>;

    /// Returns the type named `name` in `group_id`, if any.
    async fn get_type_by_name(
        &self,
        group_id: OperationalGroupId,
        name: &str,
    ) -> StorageResult<Option<OperationalGroupType>>;

    /// Returns the type with `id`, if any.
    async fn get_type(&self, id: OperationalTypeId)
    -> StorageResult<Option<OperationalGroupType>>;

    /// Inserts a type.
    async fn create_type(
        &self,
        op_type: OperationalGroupType,
    ) -> StorageResult<OperationalGroupType>;

    /// Returns the types of `group_id` ordered by name.
    async fn list_types(
        &self,
        group_id: OperationalGroupId,
    ) -> StorageResult<Vec<OperationalGroupType>>;
}

/// Read-only exchange rates.
#[async_trait]
pub trait ExchangeRateStore: Send + Sync {
    /// Returns the rate for `from` to `to`, if any.
    async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> StorageResult<Option<ExchangeRate>>;
}

/// User and administrator existence checks.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the user with `id`, if any.
    async fn get_user(&self, id: UserId) -> StorageResult<Option<UserAccount>>;
}

/// Administrator adjustment records.
#[async_trait]
pub trait ManualFundStore: Send + Sync {
    /// Inserts a record.
    async fn save_manual_fund(&self, record: ManualFundRecord) -> StorageResult<ManualFundRecord>;

    /// Returns one page of matching records in `filter.sort` order, and the total match count.
    async fn list_manual_funds(
        &self,
        filter: &ManualFundFilter,
        page: PageRequest,
    ) -> StorageResult<(Vec<ManualFundRecord>, u64)>;
}

/// Per-administrator funding ceiling.
#[async_trait]
pub trait FundingLimitProvider: Send + Sync {
    /// Returns the ceiling of `admin_id`; `None` means unlimited.
    async fn funding_limit(&self, admin_id: UserId) -> StorageResult<Option<Decimal>>;
}

/// A credit that downstream alerting may react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    /// Credited user.
    pub user_id: UserId,
    /// Credited currency.
    pub currency: CurrencyCode,
    /// Credited amount.
    pub amount: Decimal,
    /// Operational type name of the credit.
    pub operational_type: String,
}

/// Downstream hook invoked after a successful credit.
#[async_trait]
pub trait DepositNotifier: Send + Sync {
    /// Handles one credit. Failures are logged, never propagated.
    async fn notify_deposit(&self, event: &DepositEvent) -> StorageResult<()>;
}

/// Every collaborator of the ledger service.
#[derive(Clone)]
pub struct LedgerDeps {
    /// Balances.
    pub balances: Arc<dyn BalanceStore>,
    /// Audit log.
    pub logs: Arc<dyn BalanceLogStore>,
    /// Operational taxonomy.
    pub taxonomy: Arc<dyn TaxonomyStore>,
    /// Exchange rates.
    pub rates: Arc<dyn ExchangeRateStore>,
    /// Users and administrators.
    pub users: Arc<dyn UserDirectory>,
    /// Manual fund records.
    pub manual_funds: Arc<dyn ManualFundStore>,
    /// Optional per-admin funding ceilings.
    pub funding_limits: Option<Arc<dyn FundingLimitProvider>>,
    /// Optional post-credit hook.
    pub notifier: Option<Arc<dyn DepositNotifier>>,
}

impl LedgerDeps {
    /// Uses one backend for every required store, with no limits and no notifier.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: BalanceStore
            + BalanceLogStore
            + TaxonomyStore
            + ExchangeRateStore
            + UserDirectory
            + ManualFundStore
            + 'static,
    {
        Self {
            balances: store.clone(),
            logs: store.clone(),
            taxonomy: store.clone(),
            rates: store.clone(),
            users: store.clone(),
            manual_funds: store,
            funding_limits: None,
            notifier: None,
        }
    }

    /// Sets the funding limit provider.
    #[must_use]
    pub fn with_funding_limits(mut self, provider: Arc<dyn FundingLimitProvider>) -> Self {
        self.funding_limits = Some(provider);
        self
    }

    /// Sets the deposit notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn DepositNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

impl std::fmt::Debug for LedgerDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDeps")
            .field("funding_limits", &self.funding_limits.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}
