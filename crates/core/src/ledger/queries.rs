//! Read-side ledger operations. None of these take the per-user lock.

use coffer_shared::types::{BalanceLogId, PageRequest, PageResponse, UserId};

use super::error::LedgerError;
use super::service::{LedgerService, require_user};
use super::types::{
    Balance, BalanceLog, BalanceLogFilter, BalanceLogQuery, BalanceLogSort, Component,
    ManualFundFilter, ManualFundQuery, ManualFundRecord, ManualFundSort, SortDirection,
};
use crate::currency::{CurrencyService, ExchangeRate};

impl LedgerService {
    /// Returns every balance of a user; empty if the user holds none.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for the nil id and storage errors as-is.
    pub async fn get_balances(&self, user_id: UserId) -> Result<Vec<Balance>, LedgerError> {
        require_user(user_id, "user id")?;
        Ok(self.deps.balances.list_balances(user_id).await?)
    }

    /// Returns the balance of a user in one currency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCurrency` for a bad code and `NoBalance` if the user
    /// holds nothing in the currency.
    pub async fn get_balance(
        &self,
        user_id: UserId,
        currency: &str,
    ) -> Result<Balance, LedgerError> {
        require_user(user_id, "user id")?;
        let currency = CurrencyService::validate(currency)?;
        self.deps
            .balances
            .get_balance(user_id, &currency)
            .await?
            .ok_or_else(|| LedgerError::NoBalance {
                user_id,
                currency: currency.to_string(),
            })
    }

    /// Returns one page of audit entries, newest first unless sort options are set.
    ///
    /// # Errors
    ///
    /// Returns `UnknownComponent` if the query names an unknown component and
    /// `InvalidSortOption` for a sort direction other than `asc` or `desc`.
    pub async fn get_balance_logs(
        &self,
        query: BalanceLogQuery,
        page: PageRequest,
    ) -> Result<PageResponse<BalanceLog>, LedgerError> {
        let component = query
            .component
            .as_deref()
            .map(str::parse::<Component>)
            .transpose()?;
        let sort = BalanceLogSort {
            amount: SortDirection::parse_option("amount", query.sort_amount.as_deref())?,
            date: SortDirection::parse_option("date", query.sort_date.as_deref())?,
        };
        let filter = BalanceLogFilter {
            user_id: query.user_id,
            component,
            operational_group_id: query.operational_group_id,
            operational_type_id: query.operational_type_id,
            start_date: query.start_date,
            end_date: query.end_date,
            min_amount: query.min_amount,
            max_amount: query.max_amount,
            sort,
        };
        let page = page.normalized();
        let (logs, total) = self.deps.logs.query_logs(&filter, page).await?;
        Ok(PageResponse::new(logs, page.page, page.per_page, total))
    }

    /// Returns one audit entry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for the nil id and `BalanceLogNotFound` if absent.
    pub async fn get_balance_log(&self, id: BalanceLogId) -> Result<BalanceLog, LedgerError> {
        if id.is_nil() {
            return Err(LedgerError::InvalidId("balance log id"));
        }
        self.deps
            .logs
            .get_log(id)
            .await?
            .ok_or(LedgerError::BalanceLogNotFound(id))
    }

    /// Returns the stored rate for a currency pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCurrency` for a bad code and `NoExchangeRate` if no
    /// rate is stored.
    pub async fn get_exchange_rate(
        &self,
        from: &str,
        to: &str,
    ) -> Result<ExchangeRate, LedgerError> {
        let from = CurrencyService::validate(from)?;
        let to = CurrencyService::validate(to)?;
        self.deps
            .rates
            .get_rate(&from, &to)
            .await?
            .ok_or_else(|| LedgerError::NoExchangeRate {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    /// Returns one page of manual fund records, newest first unless sort options are set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSortOption` for a sort direction other than `asc` or
    /// `desc` and storage errors as-is.
    pub async fn list_manual_funds(
        &self,
        query: ManualFundQuery,
        page: PageRequest,
    ) -> Result<PageResponse<ManualFundRecord>, LedgerError> {
        let sort = ManualFundSort {
            date: SortDirection::parse_option("date", query.sort_date.as_deref())?,
            amount: SortDirection::parse_option("amount", query.sort_amount.as_deref())?,
            admin: SortDirection::parse_option("admin", query.sort_admin.as_deref())?,
        };
        let filter = ManualFundFilter {
            user_id: query.user_id,
            admin_id: query.admin_id,
            fund_type: query.fund_type,
            start_date: query.start_date,
            end_date: query.end_date,
            sort,
        };
        let page = page.normalized();
        let (records, total) = self.deps.manual_funds.list_manual_funds(&filter, page).await?;
        Ok(PageResponse::new(records, page.page, page.per_page, total))
    }
}
