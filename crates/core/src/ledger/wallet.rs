//! Idempotent, provider-driven wallet credits.
//!
//! The payment reference is the audit entry's transaction id. It is checked
//! before the lock as a fast path, checked again under the lock, and the log
//! store's unique key on transaction id catches a concurrent writer in
//! another process.

use super::error::LedgerError;
use super::saga::{OperationSaga, SagaState, SagaStep};
use super::service::{LedgerService, require_positive, require_user};
use super::types::{Component, CreditWalletOutcome, CreditWalletRequest, groups, op_types};
use crate::currency::CurrencyService;
use crate::storage::{DepositEvent, StorageError};

impl LedgerService {
    /// Returns true if no audit entry carries `payment_reference`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub async fn is_payment_reference_unique(
        &self,
        payment_reference: &str,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .deps
            .logs
            .get_log_by_transaction_id(payment_reference)
            .await?
            .is_none())
    }

    async fn reject_duplicate(&self, payment_reference: &str) -> Result<(), LedgerError> {
        if self.is_payment_reference_unique(payment_reference).await? {
            return Ok(());
        }
        tracing::warn!(payment_reference, "payment reference already processed");
        Err(LedgerError::DuplicatePaymentReference(
            payment_reference.to_string(),
        ))
    }

    /// Credits real money once per payment reference.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePaymentReference` if the reference was already
    /// credited, in which case nothing changes. A failed audit write undoes
    /// the credit and returns `Reverted`.
    pub async fn credit_wallet(
        &self,
        req: CreditWalletRequest,
    ) -> Result<CreditWalletOutcome, LedgerError> {
        // 1. Validate the request
        require_user(req.user_id, "user id")?;
        require_positive(req.amount)?;
        let currency = CurrencyService::validate(&req.currency)?;
        self.validate_amount(req.amount, &currency)?;
        let reference = req.payment_reference.trim();
        if reference.is_empty() {
            return Err(LedgerError::MissingField("payment reference"));
        }

        // 2. Fast duplicate check outside the lock
        self.reject_duplicate(reference).await?;

        let tag = self
            .taxonomy
            .get_or_create(groups::FUND, op_types::ADD_FUND)
            .await?;

        let mut saga = OperationSaga::start("credit_wallet");
        let guard = self.locks.acquire(req.user_id).await?;

        // 3. Authoritative duplicate check under the lock
        self.reject_duplicate(reference).await?;

        // 4. Credit the balance
        let applied = self
            .credit_locked(&guard, &currency, Component::RealMoney, req.amount)
            .await?;
        saga.advance(SagaState::BalanceUpdated)?;

        // 5. Write the audit entry keyed by the payment reference
        let description = format!(
            "wallet credit via {}, ref: {reference}, type: {}",
            req.provider, req.tx_type
        );
        let log = Self::build_log(
            &tag,
            &applied,
            req.amount,
            description,
            reference.to_string(),
        );
        match self.deps.logs.append_log(log).await {
            Ok(_) => saga.advance(SagaState::LogWritten)?,
            Err(err @ StorageError::AlreadyExists { .. }) => {
                tracing::warn!(
                    user_id = %req.user_id,
                    payment_reference = reference,
                    "payment reference taken by a concurrent writer, undoing credit"
                );
                return Err(
                    match self
                        .revert(&mut saga, req.user_id, &[&applied], SagaStep::LogWrite, err)
                        .await
                    {
                        LedgerError::Reverted { .. } => {
                            LedgerError::DuplicatePaymentReference(reference.to_string())
                        }
                        other => other,
                    },
                );
            }
            Err(err) => {
                tracing::error!(
                    user_id = %req.user_id,
                    payment_reference = reference,
                    error = %err,
                    "wallet credit log write failed"
                );
                return Err(self
                    .revert(&mut saga, req.user_id, &[&applied], SagaStep::LogWrite, err)
                    .await);
            }
        }
        let trace = saga.commit()?;
        drop(guard);

        tracing::info!(
            user_id = %req.user_id,
            currency = %currency,
            amount = %req.amount,
            provider = %req.provider,
            payment_reference = reference,
            "wallet credited"
        );

        self.notify_deposit(DepositEvent {
            user_id: req.user_id,
            currency: currency.clone(),
            amount: req.amount,
            operational_type: tag.type_name,
        })
        .await;

        Ok(CreditWalletOutcome {
            user_id: req.user_id,
            currency,
            new_balance: applied.new_value(),
            transaction_id: reference.to_string(),
            trace,
        })
    }
}
