//! Ledger domain types: balances, audit log entries, taxonomy, manual funds,
//! and the request/outcome shapes of every ledger operation.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use coffer_shared::types::{
    BalanceId, BalanceLogId, CurrencyCode, ManualFundId, OperationalGroupId, OperationalTypeId,
    UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::saga::SagaState;

/// Operational group names used by the ledger itself.
pub mod groups {
    /// Player deposits.
    pub const DEPOSIT: &str = "deposit";
    /// Player withdrawals.
    pub const WITHDRAWAL: &str = "withdrawal";
    /// Internal transfers, exchanges and manual adjustments.
    pub const TRANSFER: &str = "transfer";
    /// Provider-driven wallet funding.
    pub const FUND: &str = "fund";
}

/// Operational type names used by the ledger itself.
pub mod op_types {
    /// Funds added to a balance.
    pub const ADD_FUND: &str = "add_fund";
    /// Funds removed from a balance.
    pub const REMOVE_FUND: &str = "remove_fund";
    /// Currency exchange between two balances of one user.
    pub const INTERNAL_TRANSACTION: &str = "internal_transaction";
}

/// Which sub-balance an operation affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Withdrawable money.
    RealMoney,
    /// Promotional money.
    BonusMoney,
}

impl Component {
    /// Returns the wire name of the component.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RealMoney => "real_money",
            Self::BonusMoney => "bonus_money",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Component {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real_money" => Ok(Self::RealMoney),
            "bonus_money" => Ok(Self::BonusMoney),
            _ => Err(LedgerError::UnknownComponent(s.to_string())),
        }
    }
}

/// Status recorded on every audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    /// The mutation completed.
    Completed,
}

impl LogStatus {
    /// Returns the stored name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
        }
    }
}

/// One balance row per (user, currency).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Row identifier.
    pub id: BalanceId,
    /// Owning user.
    pub user_id: UserId,
    /// Currency of both components.
    pub currency: CurrencyCode,
    /// Real money component.
    pub real_money: Decimal,
    /// Bonus money component.
    pub bonus_money: Decimal,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Creates a zero balance.
    #[must_use]
    pub fn new(user_id: UserId, currency: CurrencyCode) -> Self {
        Self {
            id: BalanceId::new(),
            user_id,
            currency,
            real_money: Decimal::ZERO,
            bonus_money: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Creates a balance holding `amount` in `component` and zero in the other.
    #[must_use]
    pub fn with_initial(
        user_id: UserId,
        currency: CurrencyCode,
        component: Component,
        amount: Decimal,
    ) -> Self {
        let mut balance = Self::new(user_id, currency);
        balance.set_amount(component, amount);
        balance
    }

    /// Returns the value of one component.
    #[must_use]
    pub const fn amount(&self, component: Component) -> Decimal {
        match component {
            Component::RealMoney => self.real_money,
            Component::BonusMoney => self.bonus_money,
        }
    }

    /// Overwrites one component.
    pub fn set_amount(&mut self, component: Component, value: Decimal) {
        match component {
            Component::RealMoney => self.real_money = value,
            Component::BonusMoney => self.bonus_money = value,
        }
    }
}

/// Immutable audit record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLog {
    /// Record identifier.
    pub id: BalanceLogId,
    /// Affected user.
    pub user_id: UserId,
    /// Affected component.
    pub component: Component,
    /// Affected currency.
    pub currency: CurrencyCode,
    /// Free-text description.
    pub description: String,
    /// Amount of the change, unsigned; the direction follows the operational type.
    pub change_amount: Decimal,
    /// Operational group tag.
    pub operational_group_id: OperationalGroupId,
    /// Operational type tag.
    pub operational_type_id: OperationalTypeId,
    /// Component value after the mutation.
    pub balance_after_update: Option<Decimal>,
    /// Idempotency/correlation key, unique when present.
    pub transaction_id: Option<String>,
    /// Completion status.
    pub status: LogStatus,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Top level of the operational taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalGroup {
    /// Group identifier.
    pub id: OperationalGroupId,
    /// Unique name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Second level of the operational taxonomy, unique per (group, name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalGroupType {
    /// Type identifier.
    pub id: OperationalTypeId,
    /// Owning group.
    pub group_id: OperationalGroupId,
    /// Name, unique within the group.
    pub name: String,
    /// Description.
    pub description: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A resolved (group, type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalTag {
    /// Group identifier.
    pub group_id: OperationalGroupId,
    /// Type identifier.
    pub type_id: OperationalTypeId,
    /// Group name.
    pub group_name: String,
    /// Type name.
    pub type_name: String,
}

/// Direction of an administrator adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualFundType {
    /// Credit the user.
    AddFund,
    /// Debit the user.
    RemoveFund,
}

impl ManualFundType {
    /// Returns the stored name, which is also the operational type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AddFund => op_types::ADD_FUND,
            Self::RemoveFund => op_types::REMOVE_FUND,
        }
    }
}

impl std::str::FromStr for ManualFundType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            op_types::ADD_FUND => Ok(Self::AddFund),
            op_types::REMOVE_FUND => Ok(Self::RemoveFund),
            other => Err(LedgerError::UnknownOperationalType(other.to_string())),
        }
    }
}

/// Record of one administrator adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualFundRecord {
    /// Record identifier.
    pub id: ManualFundId,
    /// Adjusted user.
    pub user_id: UserId,
    /// Acting administrator.
    pub admin_id: UserId,
    /// Transaction id of the audit entry; `None` when the audit write failed.
    pub transaction_id: Option<String>,
    /// Direction.
    pub fund_type: ManualFundType,
    /// Adjusted amount, positive.
    pub amount: Decimal,
    /// Mandatory reason.
    pub reason: String,
    /// Currency of the adjustment.
    pub currency: CurrencyCode,
    /// Optional note.
    pub note: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A user known to the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub username: String,
}

// ============================================================================
// Requests
// ============================================================================

/// Input of deposit and withdraw.
#[derive(Debug, Clone)]
pub struct BalanceChangeRequest {
    /// Target user.
    pub user_id: UserId,
    /// Currency code as supplied by the caller.
    pub currency: String,
    /// Component name as supplied by the caller.
    pub component: String,
    /// Amount, must be positive.
    pub amount: Decimal,
    /// Free-text description, copied to the audit log by `update`.
    pub description: String,
}

/// Input of `update`: a balance change tagged with an operational group and type.
#[derive(Debug, Clone)]
pub struct UpdateBalanceRequest {
    /// The change to apply.
    pub change: BalanceChangeRequest,
    /// Group; its name selects deposit or withdrawal.
    pub operational_group_id: OperationalGroupId,
    /// Type, must belong to the group.
    pub operational_type_id: OperationalTypeId,
}

/// Input of a currency exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// User owning both balances.
    pub user_id: UserId,
    /// Source currency.
    pub currency_from: String,
    /// Target currency.
    pub currency_to: String,
    /// Amount in the source currency.
    pub amount: Decimal,
}

/// Input of a provider-driven wallet credit.
#[derive(Debug, Clone)]
pub struct CreditWalletRequest {
    /// User to credit.
    pub user_id: UserId,
    /// Currency of the credit.
    pub currency: String,
    /// Amount, must be positive.
    pub amount: Decimal,
    /// External idempotency key.
    pub payment_reference: String,
    /// Payment provider name.
    pub provider: String,
    /// Provider transaction type.
    pub tx_type: String,
}

/// Input of an administrator adjustment.
#[derive(Debug, Clone)]
pub struct ManualFundRequest {
    /// Adjusted user.
    pub user_id: UserId,
    /// Acting administrator.
    pub admin_id: UserId,
    /// Amount, must be positive.
    pub amount: Decimal,
    /// Mandatory reason.
    pub reason: String,
    /// Currency; the configured default is used when empty.
    pub currency: String,
    /// Optional note; the reason is used when empty.
    pub note: String,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of deposit and withdraw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceUpdate {
    /// Affected user.
    pub user_id: UserId,
    /// Affected currency.
    pub currency: CurrencyCode,
    /// Affected component.
    pub component: Component,
    /// Component value after the change.
    pub new_balance: Decimal,
}

/// Result of `update`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// The applied change.
    pub balance: BalanceUpdate,
    /// Resolved group name.
    pub operational_group: String,
    /// Resolved type name.
    pub operational_type: String,
    /// Transaction id of the audit entry.
    pub transaction_id: String,
    /// States the operation went through.
    pub trace: Vec<SagaState>,
}

/// Result of an exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeOutcome {
    /// User owning both balances.
    pub user_id: UserId,
    /// Source currency.
    pub currency_from: CurrencyCode,
    /// Target currency.
    pub currency_to: CurrencyCode,
    /// Amount debited from the source balance.
    pub amount: Decimal,
    /// Rate applied.
    pub rate: Decimal,
    /// Amount credited to the target balance, after rounding.
    pub exchanged_amount: Decimal,
    /// Source real money after the exchange.
    pub from_balance: Decimal,
    /// Target real money after the exchange.
    pub to_balance: Decimal,
    /// Transaction id of the audit entry.
    pub transaction_id: String,
    /// States the operation went through.
    pub trace: Vec<SagaState>,
}

/// Result of a wallet credit.
#[derive(Debug, Clone, Serialize)]
pub struct CreditWalletOutcome {
    /// Credited user.
    pub user_id: UserId,
    /// Credited currency.
    pub currency: CurrencyCode,
    /// Real money after the credit.
    pub new_balance: Decimal,
    /// The payment reference, also the audit transaction id.
    pub transaction_id: String,
    /// States the operation went through.
    pub trace: Vec<SagaState>,
}

/// Result of an administrator adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct ManualFundOutcome {
    /// The stored record.
    pub record: ManualFundRecord,
    /// Real money after the adjustment.
    pub new_balance: Decimal,
    /// True when the balance changed but the audit entry could not be written.
    pub audit_gap: bool,
    /// States the operation went through.
    pub trace: Vec<SagaState>,
}

// ============================================================================
// Queries
// ============================================================================

/// Direction of one sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

impl SortDirection {
    /// Parses an optional caller-supplied direction for `field`. Blank means unsorted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSortOption` for anything but `asc` or `desc`.
    pub fn parse_option(
        field: &'static str,
        value: Option<&str>,
    ) -> Result<Option<Self>, LedgerError> {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Ok(Some(Self::Asc)),
            "desc" => Ok(Some(Self::Desc)),
            _ => Err(LedgerError::InvalidSortOption {
                field,
                value: raw.to_string(),
            }),
        }
    }

    /// Applies the direction to an ascending comparison.
    #[must_use]
    pub const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

fn directed(direction: Option<SortDirection>, ordering: Ordering) -> Ordering {
    direction.map_or(Ordering::Equal, |d| d.apply(ordering))
}

/// Requested ordering of balance log entries: amount, then date.
///
/// Unset columns are skipped. Ties end newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceLogSort {
    /// Order by change amount.
    pub amount: Option<SortDirection>,
    /// Order by timestamp.
    pub date: Option<SortDirection>,
}

impl BalanceLogSort {
    /// Compares two entries in listing order.
    #[must_use]
    pub fn compare(&self, a: &BalanceLog, b: &BalanceLog) -> Ordering {
        directed(self.amount, a.change_amount.cmp(&b.change_amount))
            .then_with(|| directed(self.date, a.timestamp.cmp(&b.timestamp)))
            .then_with(|| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)))
    }
}

/// Requested ordering of manual fund records: date, then amount, then admin name.
///
/// Unset columns are skipped. Ties end newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualFundSort {
    /// Order by creation time.
    pub date: Option<SortDirection>,
    /// Order by amount.
    pub amount: Option<SortDirection>,
    /// Order by the administrator's username.
    pub admin: Option<SortDirection>,
}

impl ManualFundSort {
    /// Compares two records in listing order; `admin_name` resolves usernames.
    #[must_use]
    pub fn compare<'a>(
        &self,
        a: &ManualFundRecord,
        b: &ManualFundRecord,
        admin_name: impl Fn(UserId) -> Option<&'a str>,
    ) -> Ordering {
        directed(self.date, a.created_at.cmp(&b.created_at))
            .then_with(|| directed(self.amount, a.amount.cmp(&b.amount)))
            .then_with(|| {
                self.admin.map_or(Ordering::Equal, |d| {
                    d.apply(admin_name(a.admin_id).cmp(&admin_name(b.admin_id)))
                })
            })
            .then_with(|| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
    }
}

/// Caller-facing balance log query; `component` and sort options are validated by the service.
#[derive(Debug, Clone, Default)]
pub struct BalanceLogQuery {
    /// Restrict to one user.
    pub user_id: Option<UserId>,
    /// Restrict to one component name.
    pub component: Option<String>,
    /// Restrict to one operational group.
    pub operational_group_id: Option<OperationalGroupId>,
    /// Restrict to one operational type.
    pub operational_type_id: Option<OperationalTypeId>,
    /// Inclusive lower time bound.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub end_date: Option<DateTime<Utc>>,
    /// Inclusive lower change-amount bound.
    pub min_amount: Option<Decimal>,
    /// Inclusive upper change-amount bound.
    pub max_amount: Option<Decimal>,
    /// `asc` or `desc` on the change amount.
    pub sort_amount: Option<String>,
    /// `asc` or `desc` on the timestamp.
    pub sort_date: Option<String>,
}

/// Validated balance log filter handed to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceLogFilter {
    /// Restrict to one user.
    pub user_id: Option<UserId>,
    /// Restrict to one component.
    pub component: Option<Component>,
    /// Restrict to one operational group.
    pub operational_group_id: Option<OperationalGroupId>,
    /// Restrict to one operational type.
    pub operational_type_id: Option<OperationalTypeId>,
    /// Inclusive lower time bound.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub end_date: Option<DateTime<Utc>>,
    /// Inclusive lower change-amount bound.
    pub min_amount: Option<Decimal>,
    /// Inclusive upper change-amount bound.
    pub max_amount: Option<Decimal>,
    /// Listing order.
    pub sort: BalanceLogSort,
}

impl BalanceLogFilter {
    /// Returns true if `log` passes every set criterion.
    #[must_use]
    pub fn matches(&self, log: &BalanceLog) -> bool {
        self.user_id.is_none_or(|id| log.user_id == id)
            && self.component.is_none_or(|c| log.component == c)
            && self
                .operational_group_id
                .is_none_or(|id| log.operational_group_id == id)
            && self
                .operational_type_id
                .is_none_or(|id| log.operational_type_id == id)
            && self.start_date.is_none_or(|d| log.timestamp >= d)
            && self.end_date.is_none_or(|d| log.timestamp <= d)
            && self.min_amount.is_none_or(|a| log.change_amount >= a)
            && self.max_amount.is_none_or(|a| log.change_amount <= a)
    }
}

/// Caller-facing manual fund query; sort options are validated by the service.
#[derive(Debug, Clone, Default)]
pub struct ManualFundQuery {
    /// Restrict to one user.
    pub user_id: Option<UserId>,
    /// Restrict to one administrator.
    pub admin_id: Option<UserId>,
    /// Restrict to one direction.
    pub fund_type: Option<ManualFundType>,
    /// Inclusive lower time bound.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub end_date: Option<DateTime<Utc>>,
    /// `asc` or `desc` on the creation time.
    pub sort_date: Option<String>,
    /// `asc` or `desc` on the amount.
    pub sort_amount: Option<String>,
    /// `asc` or `desc` on the administrator's username.
    pub sort_admin: Option<String>,
}

/// Validated manual fund filter handed to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualFundFilter {
    /// Restrict to one user.
    pub user_id: Option<UserId>,
    /// Restrict to one administrator.
    pub admin_id: Option<UserId>,
    /// Restrict to one direction.
    pub fund_type: Option<ManualFundType>,
    /// Inclusive lower time bound.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub end_date: Option<DateTime<Utc>>,
    /// Listing order.
    pub sort: ManualFundSort,
}

impl ManualFundFilter {
    /// Returns true if `record` passes every set criterion.
    #[must_use]
    pub fn matches(&self, record: &ManualFundRecord) -> bool {
        self.user_id.is_none_or(|id| record.user_id == id)
            && self.admin_id.is_none_or(|id| record.admin_id == id)
            && self.fund_type.is_none_or(|t| record.fund_type == t)
            && self.start_date.is_none_or(|d| record.created_at >= d)
            && self.end_date.is_none_or(|d| record.created_at <= d)
    }
}
