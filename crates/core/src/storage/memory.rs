//! In-memory backend implementing every storage contract.
//!
//! Enforces the same unique keys as the PostgreSQL schema and supports fault
//! injection so tests can fail a chosen write and observe compensation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use coffer_shared::types::{
    BalanceLogId, CurrencyCode, OperationalGroupId, OperationalTypeId, PageRequest, UserId,
};
use rust_decimal::Decimal;

use super::{
    BalanceLogStore, BalanceStore, ExchangeRateStore, FundingLimitProvider, ManualFundStore,
    StorageError, StorageResult, TaxonomyStore, UserDirectory,
};
use crate::currency::ExchangeRate;
use crate::ledger::types::{
    Balance, BalanceLog, BalanceLogFilter, Component, ManualFundFilter, ManualFundRecord,
    OperationalGroup, OperationalGroupType, UserAccount,
};

/// Storage calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `get_balance`.
    GetBalance,
    /// `create_balance`.
    CreateBalance,
    /// `set_amount`.
    SetAmount,
    /// `append_log`.
    AppendLog,
    /// `get_log_by_transaction_id`.
    GetLogByTransactionId,
    /// `delete_log`.
    DeleteLog,
    /// `save_manual_fund`.
    SaveManualFund,
    /// `get_rate`.
    GetRate,
    /// `funding_limit`.
    FundingLimit,
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<(UserId, CurrencyCode), Balance>,
    logs: HashMap<BalanceLogId, BalanceLog>,
    log_tx_index: HashMap<String, BalanceLogId>,
    groups: HashMap<OperationalGroupId, OperationalGroup>,
    types: HashMap<OperationalTypeId, OperationalGroupType>,
    rates: HashMap<(CurrencyCode, CurrencyCode), ExchangeRate>,
    users: HashMap<UserId, UserAccount>,
    manual_funds: Vec<ManualFundRecord>,
    funding_limits: HashMap<UserId, Decimal>,
    /// Pending faults: (point, calls to let through before failing).
    faults: Vec<(FailPoint, usize)>,
}

impl State {
    fn trip(&mut self, point: FailPoint) -> StorageResult<()> {
        let Some(pos) = self.faults.iter().position(|(p, _)| *p == point) else {
            return Ok(());
        };
        if self.faults[pos].1 == 0 {
            self.faults.remove(pos);
            return Err(StorageError::backend(format!("injected failure at {point:?}")));
        }
        self.faults[pos].1 -= 1;
        Ok(())
    }
}

/// Mutex-guarded maps; the guard is never held across an await.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StorageResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StorageError::backend("in-memory store poisoned"))
    }

    /// Makes the next call to `point` fail.
    pub fn fail_next(&self, point: FailPoint) {
        self.fail_nth(point, 1);
    }

    /// Makes the `nth` next call to `point` fail (1 = the next call).
    pub fn fail_nth(&self, point: FailPoint, nth: usize) {
        if let Ok(mut state) = self.state() {
            state.faults.push((point, nth.saturating_sub(1)));
        }
    }

    /// Registers a user or administrator.
    pub fn add_user(&self, id: UserId, username: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.users.insert(
                id,
                UserAccount {
                    id,
                    username: username.into(),
                },
            );
        }
    }

    /// Sets or replaces an exchange rate.
    pub fn set_rate(&self, from: CurrencyCode, to: CurrencyCode, rate: Decimal) {
        if let Ok(mut state) = self.state() {
            state
                .rates
                .insert((from.clone(), to.clone()), ExchangeRate::new(from, to, rate));
        }
    }

    /// Sets or clears an administrator's funding limit.
    pub fn set_funding_limit(&self, admin_id: UserId, limit: Option<Decimal>) {
        if let Ok(mut state) = self.state() {
            match limit {
                Some(limit) => state.funding_limits.insert(admin_id, limit),
                None => state.funding_limits.remove(&admin_id),
            };
        }
    }

    /// Snapshot of every audit entry, oldest first.
    #[must_use]
    pub fn all_logs(&self) -> Vec<BalanceLog> {
        let Ok(state) = self.state() else {
            return Vec::new();
        };
        let mut logs: Vec<_> = state.logs.values().cloned().collect();
        logs.sort_by_key(|l| (l.timestamp, l.id));
        logs
    }

    /// Snapshot of every manual fund record, oldest first.
    #[must_use]
    pub fn all_manual_funds(&self) -> Vec<ManualFundRecord> {
        self.state()
            .map(|s| s.manual_funds.clone())
            .unwrap_or_default()
    }

    /// Number of stored balance rows.
    #[must_use]
    pub fn balance_count(&self) -> usize {
        self.state().map(|s| s.balances.len()).unwrap_or_default()
    }

    /// Number of stored groups and types.
    #[must_use]
    pub fn taxonomy_counts(&self) -> (usize, usize) {
        self.state()
            .map(|s| (s.groups.len(), s.types.len()))
            .unwrap_or_default()
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    (items.into_iter().skip(offset).take(limit).collect(), total)
}

#[async_trait]
impl BalanceStore for InMemoryStore {
    async fn get_balance(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> StorageResult<Option<Balance>> {
        tokio::task::yield_now().await;
        let mut state = self.state()?;
        state.trip(FailPoint::GetBalance)?;
        Ok(state.balances.get(&(user_id, currency.clone())).cloned())
    }

    async fn list_balances(&self, user_id: UserId) -> StorageResult<Vec<Balance>> {
        let state = self.state()?;
        let mut balances: Vec<_> = state
            .balances
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        balances.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(balances)
    }

    async fn create_balance(&self, balance: Balance) -> StorageResult<Balance> {
        let mut state = self.state()?;
        state.trip(FailPoint::CreateBalance)?;
        let key = (balance.user_id, balance.currency.clone());
        if state.balances.contains_key(&key) {
            return Err(StorageError::already_exists(
                "balance",
                format!("{}/{}", balance.user_id, balance.currency),
            ));
        }
        state.balances.insert(key, balance.clone());
        Ok(balance)
    }

    async fn set_amount(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
        component: Component,
        value: Decimal,
    ) -> StorageResult<Balance> {
        tokio::task::yield_now().await;
        let mut state = self.state()?;
        state.trip(FailPoint::SetAmount)?;
        let balance = state
            .balances
            .get_mut(&(user_id, currency.clone()))
            .ok_or_else(|| StorageError::not_found("balance", format!("{user_id}/{currency}")))?;
        balance.set_amount(component, value);
        balance.updated_at = Utc::now();
        Ok(balance.clone())
    }
}

#[async_trait]
impl BalanceLogStore for InMemoryStore {
    async fn append_log(&self, log: BalanceLog) -> StorageResult<BalanceLog> {
        let mut state = self.state()?;
        state.trip(FailPoint::AppendLog)?;
        if let Some(tx) = &log.transaction_id {
            if state.log_tx_index.contains_key(tx) {
                return Err(StorageError::already_exists("balance_log", tx.clone()));
            }
            state.log_tx_index.insert(tx.clone(), log.id);
        }
        state.logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn get_log(&self, id: BalanceLogId) -> StorageResult<Option<BalanceLog>> {
        Ok(self.state()?.logs.get(&id).cloned())
    }

    async fn get_log_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StorageResult<Option<BalanceLog>> {
        let mut state = self.state()?;
        state.trip(FailPoint::GetLogByTransactionId)?;
        Ok(state
            .log_tx_index
            .get(transaction_id)
            .and_then(|id| state.logs.get(id))
            .cloned())
    }

    async fn delete_log(&self, id: BalanceLogId) -> StorageResult<()> {
        let mut state = self.state()?;
        state.trip(FailPoint::DeleteLog)?;
        let log = state
            .logs
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("balance_log", id.to_string()))?;
        if let Some(tx) = log.transaction_id {
            state.log_tx_index.remove(&tx);
        }
        Ok(())
    }

    async fn query_logs(
        &self,
        filter: &BalanceLogFilter,
        page: PageRequest,
    ) -> StorageResult<(Vec<BalanceLog>, u64)> {
        let state = self.state()?;
        let mut logs: Vec<_> = state
            .logs
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        logs.sort_by(|a, b| filter.sort.compare(a, b));
        Ok(paginate(logs, page))
    }
}

#[async_trait]
impl TaxonomyStore for InMemoryStore {
    async fn get_group_by_name(&self, name: &str) -> StorageResult<Option<OperationalGroup>> {
        tokio::task::yield_now().await;
        Ok(self
            .state()?
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    async fn get_group(&self, id: OperationalGroupId) -> StorageResult<Option<OperationalGroup>> {
        Ok(self.state()?.groups.get(&id).cloned())
    }

    async fn create_group(&self, group: OperationalGroup) -> StorageResult<OperationalGroup> {
        let mut state = self.state()?;
        if state.groups.values().any(|g| g.name == group.name) {
            return Err(StorageError::already_exists(
                "operational_group",
                group.name.clone(),
            ));
        }
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn list_groups(&self) -> StorageResult<Vec<OperationalGroup>> {
        let mut groups: Vec<_> = self.state()?.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn get_type_by_name(
        &self,
        group_id: OperationalGroupId,
        name: &str,
    ) -> StorageResult<Option<OperationalGroupType>> {
        tokio::task::yield_now().await;
        Ok(self
            .state()?
            .types
            .values()
            .find(|t| t.group_id == group_id && t.name == name)
            .cloned())
    }

    async fn get_type(
        &self,
        id: OperationalTypeId,
    ) -> StorageResult<Option<OperationalGroupType>> {
        Ok(self.state()?.types.get(&id).cloned())
    }

    async fn create_type(
        &self,
        op_type: OperationalGroupType,
    ) -> StorageResult<OperationalGroupType> {
        let mut state = self.state()?;
        if !state.groups.contains_key(&op_type.group_id) {
            return Err(StorageError::not_found(
                "operational_group",
                op_type.group_id.to_string(),
            ));
        }
        if state
            .types
            .values()
            .any(|t| t.group_id == op_type.group_id && t.name == op_type.name)
        {
            return Err(StorageError::already_exists(
                "operational_group_type",
                format!("{}/{}", op_type.group_id, op_type.name),
            ));
        }
        state.types.insert(op_type.id, op_type.clone());
        Ok(op_type)
    }

    async fn list_types(
        &self,
        group_id: OperationalGroupId,
    ) -> StorageResult<Vec<OperationalGroupType>> {
        let mut types: Vec<_> = self
            .state()?
            .types
            .values()
            .filter(|t| t.group_id == group_id)
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }
}

#[async_trait]
impl ExchangeRateStore for InMemoryStore {
    async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> StorageResult<Option<ExchangeRate>> {
        let mut state = self.state()?;
        state.trip(FailPoint::GetRate)?;
        Ok(state.rates.get(&(from.clone(), to.clone())).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn get_user(&self, id: UserId) -> StorageResult<Option<UserAccount>> {
        Ok(self.state()?.users.get(&id).cloned())
    }
}

#[async_trait]
impl ManualFundStore for InMemoryStore {
    async fn save_manual_fund(&self, record: ManualFundRecord) -> StorageResult<ManualFundRecord> {
        let mut state = self.state()?;
        state.trip(FailPoint::SaveManualFund)?;
        state.manual_funds.push(record.clone());
        Ok(record)
    }

    async fn list_manual_funds(
        &self,
        filter: &ManualFundFilter,
        page: PageRequest,
    ) -> StorageResult<(Vec<ManualFundRecord>, u64)> {
        let state = self.state()?;
        let mut records: Vec<_> = state
            .manual_funds
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        let admin_name = |id: UserId| state.users.get(&id).map(|u| u.username.as_str());
        records.sort_by(|a, b| filter.sort.compare(a, b, admin_name));
        Ok(paginate(records, page))
    }
}

#[async_trait]
impl FundingLimitProvider for InMemoryStore {
    async fn funding_limit(&self, admin_id: UserId) -> StorageResult<Option<Decimal>> {
        let mut state = self.state()?;
        state.trip(FailPoint::FundingLimit)?;
        Ok(state.funding_limits.get(&admin_id).copied())
    }
}
