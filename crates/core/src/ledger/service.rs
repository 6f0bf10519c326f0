//! Ledger service: deposit, withdraw and tagged balance updates.
//!
//! Every mutating operation acquires the user's lock, reads the current
//! balance, validates, writes the balance and then the audit entry, and
//! releases the lock on every exit path. Exchange, wallet credit and manual
//! funds live in their own modules as further `impl LedgerService` blocks.

use chrono::Utc;
use coffer_shared::LedgerConfig;
use coffer_shared::types::{BalanceLogId, CurrencyCode, UserId};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::LedgerError;
use super::lock::{UserLockGuard, UserLocks};
use super::saga::{OperationSaga, SagaState, SagaStep};
use super::taxonomy::TaxonomyResolver;
use super::types::{
    Balance, BalanceChangeRequest, BalanceLog, BalanceUpdate, Component, LogStatus,
    OperationalTag, UpdateBalanceRequest, UpdateOutcome, groups,
};
use crate::currency::CurrencyService;
use crate::storage::{DepositEvent, LedgerDeps, StorageError};

/// Multi-currency balance ledger.
///
/// Operations on one user are serialized by the per-user lock; operations on
/// different users run in parallel. Reads take no lock.
pub struct LedgerService {
    pub(super) deps: LedgerDeps,
    pub(super) locks: UserLocks,
    pub(super) taxonomy: TaxonomyResolver,
    pub(super) config: LedgerConfig,
    pub(super) default_currency: CurrencyCode,
}

/// Direction of a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Direction {
    Credit,
    Debit,
}

/// A component write applied under the lock, with the value to restore on revert.
#[derive(Debug, Clone)]
pub(super) struct AppliedChange {
    pub balance: Balance,
    pub component: Component,
    pub previous: Decimal,
}

impl AppliedChange {
    pub fn new_value(&self) -> Decimal {
        self.balance.amount(self.component)
    }
}

/// Validated fields of a [`BalanceChangeRequest`].
#[derive(Debug, Clone)]
pub(super) struct ParsedChange {
    pub user_id: UserId,
    pub currency: CurrencyCode,
    pub component: Component,
    pub amount: Decimal,
}

pub(super) fn new_transaction_id() -> String {
    Uuid::now_v7().to_string()
}

pub(super) fn require_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

pub(super) fn require_user(user_id: UserId, field: &'static str) -> Result<(), LedgerError> {
    if user_id.is_nil() {
        return Err(LedgerError::InvalidId(field));
    }
    Ok(())
}

impl LedgerService {
    /// Creates a ledger over `deps`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCurrency` if the configured default currency is not valid.
    pub fn new(deps: LedgerDeps, config: LedgerConfig) -> Result<Self, LedgerError> {
        let default_currency = CurrencyService::validate(&config.default_currency)?;
        Ok(Self {
            taxonomy: TaxonomyResolver::new(deps.taxonomy.clone()),
            locks: UserLocks::new(config.lock_timeout()),
            deps,
            config,
            default_currency,
        })
    }

    /// The per-user lock registry.
    #[must_use]
    pub const fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// The operational taxonomy.
    #[must_use]
    pub const fn taxonomy(&self) -> &TaxonomyResolver {
        &self.taxonomy
    }

    /// The ledger configuration.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Checks that `amount` is positive, fits a balance column and the minor units of `currency`.
    pub(super) fn validate_amount(
        &self,
        amount: Decimal,
        currency: &CurrencyCode,
    ) -> Result<(), LedgerError> {
        require_positive(amount)?;
        CurrencyService::require_in_range(amount, currency)?;
        CurrencyService::require_scale(amount, currency, self.config.rounding_scale)
    }

    fn parse_change(&self, req: &BalanceChangeRequest) -> Result<ParsedChange, LedgerError> {
        require_user(req.user_id, "user id")?;
        let component = req.component.parse::<Component>()?;
        let currency = CurrencyService::validate(&req.currency)?;
        self.validate_amount(req.amount, &currency)?;
        Ok(ParsedChange {
            user_id: req.user_id,
            currency,
            component,
            amount: req.amount,
        })
    }

    /// Adds `amount` to a component, creating the balance row if needed.
    ///
    /// Fails with `AmountOverflow` before any write if the sum does not fit a balance column.
    pub(super) async fn credit_locked(
        &self,
        guard: &UserLockGuard,
        currency: &CurrencyCode,
        component: Component,
        amount: Decimal,
    ) -> Result<AppliedChange, LedgerError> {
        let user_id = guard.user_id();
        match self.deps.balances.get_balance(user_id, currency).await? {
            Some(current) => {
                let previous = current.amount(component);
                let updated = CurrencyService::checked_total(previous, amount).ok_or_else(|| {
                    tracing::warn!(
                        user_id = %user_id,
                        currency = %currency,
                        amount = %amount,
                        "balance overflow"
                    );
                    LedgerError::AmountOverflow {
                        amount,
                        currency: currency.to_string(),
                    }
                })?;
                let balance = self
                    .deps
                    .balances
                    .set_amount(user_id, currency, component, updated)
                    .await?;
                Ok(AppliedChange {
                    balance,
                    component,
                    previous,
                })
            }
            None => {
                let balance = self
                    .deps
                    .balances
                    .create_balance(Balance::with_initial(
                        user_id,
                        currency.clone(),
                        component,
                        amount,
                    ))
                    .await?;
                tracing::debug!(user_id = %user_id, currency = %currency, "balance created");
                Ok(AppliedChange {
                    balance,
                    component,
                    previous: Decimal::ZERO,
                })
            }
        }
    }

    /// Subtracts `amount` from a component; the result may not go negative.
    pub(super) async fn debit_locked(
        &self,
        guard: &UserLockGuard,
        currency: &CurrencyCode,
        component: Component,
        amount: Decimal,
    ) -> Result<AppliedChange, LedgerError> {
        let user_id = guard.user_id();
        let current = self
            .deps
            .balances
            .get_balance(user_id, currency)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, currency = %currency, "no balance for currency");
                LedgerError::NoBalance {
                    user_id,
                    currency: currency.to_string(),
                }
            })?;

        let previous = current.amount(component);
        let remaining = previous - amount;
        if remaining < Decimal::ZERO {
            tracing::warn!(
                user_id = %user_id,
                currency = %currency,
                component = %component,
                available = %previous,
                requested = %amount,
                "insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds {
                user_id,
                currency: currency.to_string(),
                available: previous,
                requested: amount,
            });
        }

        let balance = self
            .deps
            .balances
            .set_amount(user_id, currency, component, remaining)
            .await?;
        Ok(AppliedChange {
            balance,
            component,
            previous,
        })
    }

    async fn apply_locked(
        &self,
        guard: &UserLockGuard,
        direction: Direction,
        change: &ParsedChange,
    ) -> Result<AppliedChange, LedgerError> {
        match direction {
            Direction::Credit => {
                self.credit_locked(guard, &change.currency, change.component, change.amount)
                    .await
            }
            Direction::Debit => {
                self.debit_locked(guard, &change.currency, change.component, change.amount)
                    .await
            }
        }
    }

    /// Restores each component in `changes` and finishes the saga as reverted.
    ///
    /// Returns the error the operation should report: `Reverted` carrying
    /// `cause` when every restore succeeded, `CompensationFailed` otherwise.
    pub(super) async fn revert(
        &self,
        saga: &mut OperationSaga,
        user_id: UserId,
        changes: &[&AppliedChange],
        failed_step: SagaStep,
        cause: StorageError,
    ) -> LedgerError {
        if let Err(err) = saga.advance(SagaState::Reverting) {
            return err;
        }
        for change in changes {
            let currency = &change.balance.currency;
            if let Err(err) = self
                .deps
                .balances
                .set_amount(user_id, currency, change.component, change.previous)
                .await
            {
                tracing::error!(
                    operation = saga.operation(),
                    user_id = %user_id,
                    currency = %currency,
                    component = %change.component,
                    restore_to = %change.previous,
                    error = %err,
                    "compensation failed, balance left inconsistent"
                );
                return LedgerError::CompensationFailed {
                    operation: saga.operation(),
                    cause: format!("{failed_step} failed ({cause}); restore failed ({err})"),
                };
            }
        }
        if let Err(err) = saga.advance(SagaState::Reverted) {
            return err;
        }
        tracing::warn!(
            operation = saga.operation(),
            user_id = %user_id,
            failed_step = %failed_step,
            error = %cause,
            "operation reverted"
        );
        LedgerError::Reverted {
            operation: saga.operation(),
            failed_step,
            source: cause,
        }
    }

    pub(super) fn build_log(
        tag: &OperationalTag,
        change: &AppliedChange,
        change_amount: Decimal,
        description: String,
        transaction_id: String,
    ) -> BalanceLog {
        BalanceLog {
            id: BalanceLogId::new(),
            user_id: change.balance.user_id,
            component: change.component,
            currency: change.balance.currency.clone(),
            description,
            change_amount,
            operational_group_id: tag.group_id,
            operational_type_id: tag.type_id,
            balance_after_update: Some(change.new_value()),
            transaction_id: Some(transaction_id),
            status: LogStatus::Completed,
            timestamp: Utc::now(),
        }
    }

    /// Invokes the deposit notifier; failures are logged only.
    pub(super) async fn notify_deposit(&self, event: DepositEvent) {
        let Some(notifier) = &self.deps.notifier else {
            return;
        };
        if let Err(err) = notifier.notify_deposit(&event).await {
            tracing::error!(
                user_id = %event.user_id,
                currency = %event.currency,
                amount = %event.amount,
                error = %err,
                "deposit notifier failed"
            );
        }
    }

    /// Adds funds to one component, creating the balance row if needed.
    ///
    /// Writes no audit entry; use [`Self::update`] for a logged change.
    ///
    /// # Errors
    ///
    /// Returns validation errors before any write and storage errors as-is.
    pub async fn deposit(&self, req: BalanceChangeRequest) -> Result<BalanceUpdate, LedgerError> {
        let change = self.parse_change(&req)?;
        let guard = self.locks.acquire(change.user_id).await?;
        let applied = self.apply_locked(&guard, Direction::Credit, &change).await?;
        tracing::info!(
            user_id = %change.user_id,
            currency = %change.currency,
            component = %change.component,
            amount = %change.amount,
            new_balance = %applied.new_value(),
            "deposit applied"
        );
        Ok(BalanceUpdate {
            user_id: change.user_id,
            currency: change.currency,
            component: change.component,
            new_balance: applied.new_value(),
        })
    }

    /// Removes funds from one component of an existing balance.
    ///
    /// Only the requested component changes. Writes no audit entry.
    ///
    /// # Errors
    ///
    /// Returns `NoBalance` if the user holds no balance in the currency and
    /// `InsufficientFunds` if the component would go negative; neither writes.
    pub async fn withdraw(&self, req: BalanceChangeRequest) -> Result<BalanceUpdate, LedgerError> {
        let change = self.parse_change(&req)?;
        let guard = self.locks.acquire(change.user_id).await?;
        let applied = self.apply_locked(&guard, Direction::Debit, &change).await?;
        tracing::info!(
            user_id = %change.user_id,
            currency = %change.currency,
            component = %change.component,
            amount = %change.amount,
            new_balance = %applied.new_value(),
            "withdrawal applied"
        );
        Ok(BalanceUpdate {
            user_id: change.user_id,
            currency: change.currency,
            component: change.component,
            new_balance: applied.new_value(),
        })
    }

    /// Applies a deposit or withdrawal selected by the operational group and
    /// writes its audit entry.
    ///
    /// The lock is held across the balance write and the log write. If the
    /// log write fails the balance is restored and `Reverted` is returned.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperationalGroup` if the group is missing or is neither
    /// a deposit nor a withdrawal group, plus the errors of deposit/withdraw.
    pub async fn update(&self, req: UpdateBalanceRequest) -> Result<UpdateOutcome, LedgerError> {
        // 1. Validate the change
        let change = self.parse_change(&req.change)?;

        // 2. Resolve the operational group and type
        let tag = self
            .taxonomy
            .resolve(req.operational_group_id, req.operational_type_id)
            .await?;
        let direction = if tag.group_name.eq_ignore_ascii_case(groups::DEPOSIT) {
            Direction::Credit
        } else if tag.group_name.eq_ignore_ascii_case(groups::WITHDRAWAL) {
            Direction::Debit
        } else {
            tracing::warn!(
                group = %tag.group_name,
                "operational group is not deposit or withdrawal"
            );
            return Err(LedgerError::UnknownOperationalGroup(tag.group_name));
        };

        let mut saga = OperationSaga::start("update");
        let guard = self.locks.acquire(change.user_id).await?;

        // 3. Apply the balance change
        let applied = self.apply_locked(&guard, direction, &change).await?;
        saga.advance(SagaState::BalanceUpdated)?;

        // 4. Write the audit entry
        let transaction_id = new_transaction_id();
        let log = Self::build_log(
            &tag,
            &applied,
            change.amount,
            req.change.description.clone(),
            transaction_id.clone(),
        );
        if let Err(err) = self.deps.logs.append_log(log).await {
            tracing::error!(
                user_id = %change.user_id,
                transaction_id = %transaction_id,
                error = %err,
                "balance log write failed"
            );
            return Err(self
                .revert(&mut saga, change.user_id, &[&applied], SagaStep::LogWrite, err)
                .await);
        }
        saga.advance(SagaState::LogWritten)?;
        let trace = saga.commit()?;
        drop(guard);

        tracing::info!(
            user_id = %change.user_id,
            currency = %change.currency,
            amount = %change.amount,
            group = %tag.group_name,
            op_type = %tag.type_name,
            transaction_id = %transaction_id,
            "balance updated"
        );

        if direction == Direction::Credit {
            self.notify_deposit(DepositEvent {
                user_id: change.user_id,
                currency: change.currency.clone(),
                amount: change.amount,
                operational_type: tag.type_name.clone(),
            })
            .await;
        }

        Ok(UpdateOutcome {
            balance: BalanceUpdate {
                user_id: change.user_id,
                currency: change.currency,
                component: change.component,
                new_balance: applied.new_value(),
            },
            operational_group: tag.group_name,
            operational_type: tag.type_name,
            transaction_id,
            trace,
        })
    }
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("config", &self.config)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}
