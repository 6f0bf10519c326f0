//! Currency exchange between two balances of one user.

use rust_decimal::Decimal;

use super::error::LedgerError;
use super::saga::{OperationSaga, SagaState, SagaStep};
use super::service::{AppliedChange, LedgerService, new_transaction_id, require_user};
use super::types::{Balance, Component, ExchangeOutcome, ExchangeRequest, groups, op_types};
use crate::currency::CurrencyService;

impl LedgerService {
    /// Moves `amount` of real money from one currency to another at the stored rate.
    ///
    /// The credited amount is `amount × rate` rounded half-to-even to the
    /// target currency's minor units. The target balance is credited first,
    /// then the source is debited; if the debit fails the credit is undone.
    /// A failed audit write undoes both.
    ///
    /// # Errors
    ///
    /// Returns validation errors, `NoBalance`, `InsufficientFunds`,
    /// `NoExchangeRate`, `ExchangeAmountTooSmall` and `AmountOverflow` before
    /// any balance write; `Reverted` or `CompensationFailed`
    /// after a failed step.
    pub async fn exchange(&self, req: ExchangeRequest) -> Result<ExchangeOutcome, LedgerError> {
        // 1. Validate the request
        require_user(req.user_id, "user id")?;
        let from = CurrencyService::validate(&req.currency_from)?;
        let to = CurrencyService::validate(&req.currency_to)?;
        self.validate_amount(req.amount, &from)?;
        if from == to {
            return Err(LedgerError::SameCurrencyExchange);
        }

        let user_id = req.user_id;
        let mut saga = OperationSaga::start("exchange");
        let guard = self.locks.acquire(user_id).await?;

        // 2. Resolve the internal transfer tag
        let tag = self
            .taxonomy
            .get_or_create(groups::TRANSFER, op_types::INTERNAL_TRANSACTION)
            .await?;

        // 3. Check the source balance
        let from_balance = self
            .deps
            .balances
            .get_balance(user_id, &from)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, currency = %from, "no balance to exchange from");
                LedgerError::NoBalance {
                    user_id,
                    currency: from.to_string(),
                }
            })?;
        if from_balance.real_money < req.amount {
            tracing::warn!(
                user_id = %user_id,
                currency = %from,
                available = %from_balance.real_money,
                requested = %req.amount,
                "insufficient funds for exchange"
            );
            return Err(LedgerError::InsufficientFunds {
                user_id,
                currency: from.to_string(),
                available: from_balance.real_money,
                requested: req.amount,
            });
        }

        // 4. Look up the rate
        let rate = self
            .deps
            .rates
            .get_rate(&from, &to)
            .await?
            .ok_or_else(|| LedgerError::NoExchangeRate {
                from: from.to_string(),
                to: to.to_string(),
            })?;
        if !rate.is_usable() {
            return Err(LedgerError::InvalidExchangeRate {
                from: from.to_string(),
                to: to.to_string(),
                rate: rate.rate,
            });
        }
        let overflow = || LedgerError::AmountOverflow {
            amount: req.amount,
            currency: to.to_string(),
        };
        let exchanged =
            CurrencyService::convert(req.amount, rate.rate, &to, self.config.rounding_scale)
                .ok_or_else(overflow)?;
        if exchanged <= Decimal::ZERO {
            tracing::warn!(
                user_id = %user_id,
                from = %from,
                to = %to,
                amount = %req.amount,
                rate = %rate.rate,
                "exchange rounds to zero"
            );
            return Err(LedgerError::ExchangeAmountTooSmall {
                amount: req.amount,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        // 5. Read or create the target balance
        let existing = self.deps.balances.get_balance(user_id, &to).await?;
        let current = existing.as_ref().map_or(Decimal::ZERO, |b| b.real_money);
        let target_after =
            CurrencyService::checked_total(current, exchanged).ok_or_else(overflow)?;
        let to_balance = match existing {
            Some(balance) => balance,
            None => {
                self.deps
                    .balances
                    .create_balance(Balance::new(user_id, to.clone()))
                    .await?
            }
        };

        // 6. Credit the target
        let credited = self
            .deps
            .balances
            .set_amount(user_id, &to, Component::RealMoney, target_after)
            .await?;
        let credit = AppliedChange {
            previous: to_balance.real_money,
            component: Component::RealMoney,
            balance: credited,
        };
        saga.advance(SagaState::BalanceUpdated)?;

        // 7. Debit the source, undoing the credit on failure
        let debited = match self
            .deps
            .balances
            .set_amount(
                user_id,
                &from,
                Component::RealMoney,
                from_balance.real_money - req.amount,
            )
            .await
        {
            Ok(balance) => balance,
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    currency = %from,
                    error = %err,
                    "exchange debit failed"
                );
                return Err(self
                    .revert(&mut saga, user_id, &[&credit], SagaStep::BalanceUpdate, err)
                    .await);
            }
        };
        let debit = AppliedChange {
            previous: from_balance.real_money,
            component: Component::RealMoney,
            balance: debited,
        };

        // 8. Write the audit entry on the target side
        let transaction_id = new_transaction_id();
        let description = format!(
            "exchange {} {from} to {exchanged} {to} at rate {}",
            req.amount, rate.rate
        );
        let log = Self::build_log(
            &tag,
            &credit,
            exchanged,
            description,
            transaction_id.clone(),
        );
        if let Err(err) = self.deps.logs.append_log(log).await {
            tracing::error!(
                user_id = %user_id,
                transaction_id = %transaction_id,
                error = %err,
                "exchange log write failed"
            );
            return Err(self
                .revert(&mut saga, user_id, &[&debit, &credit], SagaStep::LogWrite, err)
                .await);
        }
        saga.advance(SagaState::LogWritten)?;
        let trace = saga.commit()?;
        drop(guard);

        tracing::info!(
            user_id = %user_id,
            from = %from,
            to = %to,
            amount = %req.amount,
            rate = %rate.rate,
            exchanged = %exchanged,
            transaction_id = %transaction_id,
            "exchange completed"
        );

        Ok(ExchangeOutcome {
            user_id,
            currency_from: from,
            currency_to: to,
            amount: req.amount,
            rate: rate.rate,
            exchanged_amount: exchanged,
            from_balance: debit.new_value(),
            to_balance: credit.new_value(),
            transaction_id,
            trace,
        })
    }
}
