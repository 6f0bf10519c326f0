//! Administrator manual fund adjustments.
//!
//! Steps: balance write, audit entry, manual fund record. A failed audit write
//! keeps the balance change and records the gap; a failed record write
//! restores the balance and deletes the audit entry.

use chrono::Utc;
use coffer_shared::types::{CurrencyCode, ManualFundId, UserId};
use rust_decimal::Decimal;

use super::error::LedgerError;
use super::saga::{OperationSaga, SagaState, SagaStep};
use super::service::{LedgerService, new_transaction_id, require_positive, require_user};
use super::types::{
    Component, ManualFundOutcome, ManualFundRecord, ManualFundRequest, ManualFundType, groups,
};
use crate::currency::CurrencyService;
use crate::storage::DepositEvent;

impl LedgerService {
    /// Adds real money to a user on behalf of an administrator.
    ///
    /// # Errors
    ///
    /// Returns validation errors (including `FundingLimitExceeded`) before any
    /// write, and `Reverted` if the manual fund record cannot be saved.
    pub async fn add_manual_funds(
        &self,
        req: ManualFundRequest,
    ) -> Result<ManualFundOutcome, LedgerError> {
        self.manual_fund(req, ManualFundType::AddFund).await
    }

    /// Removes real money from a user on behalf of an administrator.
    ///
    /// # Errors
    ///
    /// Returns `NoBalance` or `InsufficientFunds` if the user cannot cover the
    /// amount, plus the errors of [`Self::add_manual_funds`].
    pub async fn remove_manual_funds(
        &self,
        req: ManualFundRequest,
    ) -> Result<ManualFundOutcome, LedgerError> {
        self.manual_fund(req, ManualFundType::RemoveFund).await
    }

    async fn validate_fund_request(
        &self,
        req: &ManualFundRequest,
        fund_type: ManualFundType,
    ) -> Result<CurrencyCode, LedgerError> {
        require_positive(req.amount)?;
        require_user(req.user_id, "user id")?;
        require_user(req.admin_id, "admin id")?;
        if req.reason.trim().is_empty() {
            return Err(LedgerError::MissingField("reason"));
        }
        let currency = if req.currency.trim().is_empty() {
            self.default_currency.clone()
        } else {
            CurrencyService::validate(&req.currency)?
        };
        self.validate_amount(req.amount, &currency)?;

        if self.deps.users.get_user(req.user_id).await?.is_none() {
            return Err(LedgerError::UserNotFound(req.user_id));
        }
        if self.deps.users.get_user(req.admin_id).await?.is_none() {
            tracing::error!(admin_id = %req.admin_id, "unable to find admin");
            return Err(LedgerError::AdminNotFound(req.admin_id));
        }

        if fund_type == ManualFundType::AddFund {
            self.check_funding_limit(req.admin_id, req.amount).await?;
        }
        Ok(currency)
    }

    async fn check_funding_limit(
        &self,
        admin_id: UserId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let Some(provider) = &self.deps.funding_limits else {
            return Ok(());
        };
        match provider.funding_limit(admin_id).await {
            Ok(Some(limit)) if amount > limit => {
                tracing::warn!(
                    admin_id = %admin_id,
                    requested = %amount,
                    limit = %limit,
                    "funding limit exceeded"
                );
                Err(LedgerError::FundingLimitExceeded {
                    admin_id,
                    amount,
                    limit,
                })
            }
            Ok(_) => Ok(()),
            Err(err) => {
                // Lookup failures do not block funding.
                tracing::error!(
                    admin_id = %admin_id,
                    error = %err,
                    "failed to get admin funding limit"
                );
                Ok(())
            }
        }
    }

    async fn manual_fund(
        &self,
        req: ManualFundRequest,
        fund_type: ManualFundType,
    ) -> Result<ManualFundOutcome, LedgerError> {
        // 1. Validate the request
        let currency = self.validate_fund_request(&req, fund_type).await?;
        let tag = self
            .taxonomy
            .get_or_create(groups::TRANSFER, fund_type.as_str())
            .await?;

        let operation = match fund_type {
            ManualFundType::AddFund => "manual_fund_add",
            ManualFundType::RemoveFund => "manual_fund_remove",
        };
        let mut saga = OperationSaga::start(operation);
        let guard = self.locks.acquire(req.user_id).await?;

        // 2. Apply the balance change
        let applied = match fund_type {
            ManualFundType::AddFund => {
                self.credit_locked(&guard, &currency, Component::RealMoney, req.amount)
                    .await?
            }
            ManualFundType::RemoveFund => {
                self.debit_locked(&guard, &currency, Component::RealMoney, req.amount)
                    .await?
            }
        };
        saga.advance(SagaState::BalanceUpdated)?;

        // 3. Write the audit entry; a failure here keeps the balance change
        let log = Self::build_log(
            &tag,
            &applied,
            req.amount,
            req.reason.clone(),
            new_transaction_id(),
        );
        let written_log = match self.deps.logs.append_log(log).await {
            Ok(log) => {
                saga.advance(SagaState::LogWritten)?;
                Some(log)
            }
            Err(err) => {
                tracing::error!(
                    operation,
                    user_id = %req.user_id,
                    admin_id = %req.admin_id,
                    amount = %req.amount,
                    error = %err,
                    "balance log write failed, balance change kept without audit entry"
                );
                None
            }
        };

        // 4. Write the manual fund record
        let record = ManualFundRecord {
            id: ManualFundId::new(),
            user_id: req.user_id,
            admin_id: req.admin_id,
            transaction_id: written_log.as_ref().and_then(|l| l.transaction_id.clone()),
            fund_type,
            amount: req.amount,
            reason: req.reason.clone(),
            currency: currency.clone(),
            note: if req.note.trim().is_empty() {
                req.reason.clone()
            } else {
                req.note.clone()
            },
            created_at: Utc::now(),
        };
        let record = match self.deps.manual_funds.save_manual_fund(record).await {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(
                    operation,
                    user_id = %req.user_id,
                    error = %err,
                    "manual fund record write failed"
                );
                let reverted = self
                    .revert(&mut saga, req.user_id, &[&applied], SagaStep::SideRecordWrite, err)
                    .await;
                if let Some(log) = written_log
                    && let Err(del_err) = self.deps.logs.delete_log(log.id).await
                {
                    tracing::error!(
                        operation,
                        log_id = %log.id,
                        error = %del_err,
                        "failed to delete balance log during compensation"
                    );
                    return Err(LedgerError::CompensationFailed {
                        operation,
                        cause: format!("{reverted}; log delete failed ({del_err})"),
                    });
                }
                return Err(reverted);
            }
        };
        saga.advance(SagaState::SideRecordWritten)?;
        let trace = saga.commit()?;
        drop(guard);

        let audit_gap = record.transaction_id.is_none();
        tracing::info!(
            operation,
            user_id = %req.user_id,
            admin_id = %req.admin_id,
            currency = %currency,
            amount = %req.amount,
            audit_gap,
            "manual fund applied"
        );

        if fund_type == ManualFundType::AddFund {
            self.notify_deposit(DepositEvent {
                user_id: req.user_id,
                currency,
                amount: req.amount,
                operational_type: tag.type_name,
            })
            .await;
        }

        Ok(ManualFundOutcome {
            record,
            new_balance: applied.new_value(),
            audit_gap,
            trace,
        })
    }
}
