//! Scenario tests for LedgerService against the in-memory backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coffer_shared::LedgerConfig;
use coffer_shared::types::{BalanceLogId, CurrencyCode, PageRequest, UserId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::error::LedgerError;
use super::saga::{SagaState, SagaStep};
use super::service::LedgerService;
use crate::currency::CurrencyService;
use super::types::{
    BalanceChangeRequest, BalanceLog, BalanceLogFilter, BalanceLogQuery, CreditWalletRequest,
    ExchangeRequest, ManualFundQuery, ManualFundRequest, ManualFundType, OperationalTag,
    UpdateBalanceRequest, groups, op_types,
};
use crate::storage::memory::FailPoint;
use crate::storage::{
    BalanceLogStore, DepositEvent, DepositNotifier, InMemoryStore, LedgerDeps, StorageError,
    StorageResult,
};

fn code(s: &str) -> CurrencyCode {
    CurrencyCode::parse(s).unwrap()
}

struct Harness {
    store: Arc<InMemoryStore>,
    ledger: LedgerService,
    user: UserId,
    admin: UserId,
}

fn harness() -> Harness {
    harness_with(LedgerConfig::default(), |deps, _| deps)
}

fn harness_with(
    config: LedgerConfig,
    customize: impl FnOnce(LedgerDeps, &Arc<InMemoryStore>) -> LedgerDeps,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::new();
    let admin = UserId::new();
    store.add_user(user, "player");
    store.add_user(admin, "admin");
    let deps = customize(LedgerDeps::from_store(store.clone()), &store);
    let ledger = LedgerService::new(deps, config).unwrap();
    Harness {
        store,
        ledger,
        user,
        admin,
    }
}

fn change(
    user_id: UserId,
    currency: &str,
    component: &str,
    amount: Decimal,
) -> BalanceChangeRequest {
    BalanceChangeRequest {
        user_id,
        currency: currency.to_string(),
        component: component.to_string(),
        amount,
        description: "test".to_string(),
    }
}

fn real(user_id: UserId, currency: &str, amount: Decimal) -> BalanceChangeRequest {
    change(user_id, currency, "real_money", amount)
}

fn wallet_credit(user_id: UserId, amount: Decimal, reference: &str) -> CreditWalletRequest {
    CreditWalletRequest {
        user_id,
        currency: "USD".to_string(),
        amount,
        payment_reference: reference.to_string(),
        provider: "stripe".to_string(),
        tx_type: "card".to_string(),
    }
}

fn manual(h: &Harness, amount: Decimal, currency: &str) -> ManualFundRequest {
    ManualFundRequest {
        user_id: h.user,
        admin_id: h.admin,
        amount,
        reason: "goodwill".to_string(),
        currency: currency.to_string(),
        note: String::new(),
    }
}

async fn tag(h: &Harness, group: &str, op_type: &str) -> OperationalTag {
    h.ledger.taxonomy().get_or_create(group, op_type).await.unwrap()
}

async fn update_request(h: &Harness, group: &str, amount: Decimal) -> UpdateBalanceRequest {
    let tag = tag(h, group, "card").await;
    UpdateBalanceRequest {
        change: real(h.user, "USD", amount),
        operational_group_id: tag.group_id,
        operational_type_id: tag.type_id,
    }
}

async fn real_money(h: &Harness, currency: &str) -> Decimal {
    h.ledger.get_balance(h.user, currency).await.unwrap().real_money
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<DepositEvent>>,
    fail: bool,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<DepositEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl DepositNotifier for RecordingNotifier {
    async fn notify_deposit(&self, event: &DepositEvent) -> StorageResult<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(StorageError::Unavailable("alerting down".to_string()));
        }
        Ok(())
    }
}

/// Log store whose transaction-id lookup never finds anything, standing in
/// for a writer in another process that wins the race after the checks.
struct BlindLookup(Arc<InMemoryStore>);

#[async_trait]
impl BalanceLogStore for BlindLookup {
    async fn append_log(&self, log: BalanceLog) -> StorageResult<BalanceLog> {
        self.0.append_log(log).await
    }

    async fn get_log(&self, id: BalanceLogId) -> StorageResult<Option<BalanceLog>> {
        self.0.get_log(id).await
    }

    async fn get_log_by_transaction_id(&self, _: &str) -> StorageResult<Option<BalanceLog>> {
        Ok(None)
    }

    async fn delete_log(&self, id: BalanceLogId) -> StorageResult<()> {
        self.0.delete_log(id).await
    }

    async fn query_logs(
        &self,
        filter: &BalanceLogFilter,
        page: PageRequest,
    ) -> StorageResult<(Vec<BalanceLog>, u64)> {
        self.0.query_logs(filter, page).await
    }
}

// ============================================================================
// Deposit and withdraw
// ============================================================================

#[tokio::test]
async fn test_deposit_creates_balance_then_accumulates() {
    let h = harness();
    let first = h.ledger.deposit(real(h.user, "usd", dec!(100))).await.unwrap();
    assert_eq!(first.new_balance, dec!(100));
    assert_eq!(first.currency, code("USD"));

    let second = h.ledger.deposit(real(h.user, "USD", dec!(0.25))).await.unwrap();
    assert_eq!(second.new_balance, dec!(100.25));
    assert_eq!(h.store.balance_count(), 1);
    assert!(h.store.all_logs().is_empty(), "deposit writes no audit entry");
}

#[tokio::test]
async fn test_deposit_rejects_bad_input() {
    let h = harness();
    let zero = h.ledger.deposit(real(h.user, "USD", Decimal::ZERO)).await;
    assert!(matches!(zero, Err(LedgerError::InvalidAmount(_))));

    let negative = h.ledger.deposit(real(h.user, "USD", dec!(-5))).await;
    assert!(matches!(negative, Err(LedgerError::InvalidAmount(_))));

    let component = h.ledger.deposit(change(h.user, "USD", "cash", dec!(5))).await;
    assert!(matches!(component, Err(LedgerError::UnknownComponent(_))));

    let currency = h.ledger.deposit(real(h.user, "XYZ", dec!(5))).await;
    assert!(matches!(currency, Err(LedgerError::InvalidCurrency(_))));

    let nil = h.ledger.deposit(real(UserId::nil(), "USD", dec!(5))).await;
    assert!(matches!(nil, Err(LedgerError::InvalidId(_))));

    assert_eq!(h.store.balance_count(), 0);
}

#[tokio::test]
async fn test_deposit_rejects_extra_decimal_places() {
    let h = harness();
    let cents = h.ledger.deposit(real(h.user, "USD", dec!(0.00004))).await;
    assert!(matches!(
        cents,
        Err(LedgerError::AmountPrecision { scale: 2, .. })
    ));
    let yen = h.ledger.deposit(real(h.user, "JPY", dec!(1.5))).await.unwrap_err();
    assert_eq!(yen.http_status_code(), 400);
    assert_eq!(h.store.balance_count(), 0);

    let padded = h.ledger.deposit(real(h.user, "JPY", dec!(150.00))).await.unwrap();
    assert_eq!(padded.new_balance, dec!(150));
}

#[tokio::test]
async fn test_deposit_past_column_limit_is_rejected() {
    let h = harness();
    let huge = h.ledger.deposit(real(h.user, "USD", Decimal::MAX)).await;
    assert!(matches!(huge, Err(LedgerError::AmountOverflow { .. })));
    assert_eq!(h.store.balance_count(), 0);

    let max = CurrencyService::MAX_AMOUNT.trunc();
    h.ledger.deposit(real(h.user, "USD", max)).await.unwrap();
    let err = h.ledger.deposit(real(h.user, "USD", max)).await.unwrap_err();
    assert!(matches!(err, LedgerError::AmountOverflow { .. }));
    assert_eq!(err.http_status_code(), 400);
    assert_eq!(real_money(&h, "USD").await, max);
}

#[tokio::test]
async fn test_withdraw_touches_only_requested_component() {
    let h = harness();
    h.ledger.deposit(real(h.user, "USD", dec!(50))).await.unwrap();
    h.ledger
        .deposit(change(h.user, "USD", "bonus_money", dec!(20)))
        .await
        .unwrap();

    let out = h
        .ledger
        .withdraw(change(h.user, "USD", "bonus_money", dec!(5)))
        .await
        .unwrap();
    assert_eq!(out.new_balance, dec!(15));

    let balance = h.ledger.get_balance(h.user, "USD").await.unwrap();
    assert_eq!(balance.real_money, dec!(50));
    assert_eq!(balance.bonus_money, dec!(15));
}

#[tokio::test]
async fn test_withdraw_never_goes_negative() {
    let h = harness();
    let missing = h.ledger.withdraw(real(h.user, "USD", dec!(1))).await;
    assert!(matches!(missing, Err(LedgerError::NoBalance { .. })));

    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();
    let err = h
        .ledger
        .withdraw(real(h.user, "USD", dec!(10.01)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds { available, requested, .. }
            if available == dec!(10) && requested == dec!(10.01)
    ));
    assert_eq!(err.http_status_code(), 422);
    assert_eq!(real_money(&h, "USD").await, dec!(10));

    let exact = h.ledger.withdraw(real(h.user, "USD", dec!(10))).await.unwrap();
    assert_eq!(exact.new_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_deposit_times_out_while_lock_is_held() {
    let config = LedgerConfig {
        lock_timeout_ms: 20,
        ..LedgerConfig::default()
    };
    let h = harness_with(config, |deps, _| deps);
    let _held = h.ledger.locks().acquire(h.user).await.unwrap();

    let err = h
        .ledger
        .deposit(real(h.user, "USD", dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LockTimeout { .. }));
    assert!(err.is_retryable());
    assert_eq!(h.store.balance_count(), 0);
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_deposit_writes_audit_entry() {
    let h = harness();
    let req = update_request(&h, groups::DEPOSIT, dec!(40)).await;
    let out = h.ledger.update(req.clone()).await.unwrap();

    assert_eq!(out.balance.new_balance, dec!(40));
    assert_eq!(out.operational_group, groups::DEPOSIT);
    assert_eq!(
        out.trace,
        vec![
            SagaState::Validated,
            SagaState::BalanceUpdated,
            SagaState::LogWritten,
            SagaState::Committed,
        ]
    );

    let logs = h.store.all_logs();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.change_amount, dec!(40));
    assert_eq!(log.balance_after_update, Some(dec!(40)));
    assert_eq!(log.operational_group_id, req.operational_group_id);
    assert_eq!(log.transaction_id.as_deref(), Some(out.transaction_id.as_str()));
    assert_eq!(log.status.as_str(), "COMPLETED");
}

#[tokio::test]
async fn test_update_withdrawal_group_debits() {
    let h = harness();
    h.ledger.deposit(real(h.user, "USD", dec!(40))).await.unwrap();
    let req = update_request(&h, groups::WITHDRAWAL, dec!(15)).await;
    let out = h.ledger.update(req).await.unwrap();
    assert_eq!(out.balance.new_balance, dec!(25));
}

#[tokio::test]
async fn test_update_rejects_other_groups_and_mismatched_types() {
    let h = harness();
    let req = update_request(&h, groups::TRANSFER, dec!(5)).await;
    let err = h.ledger.update(req).await.unwrap_err();
    assert!(matches!(err, LedgerError::UnknownOperationalGroup(ref g) if g == groups::TRANSFER));

    let deposit = tag(&h, groups::DEPOSIT, "card").await;
    let withdrawal = tag(&h, groups::WITHDRAWAL, "card").await;
    let mismatched = UpdateBalanceRequest {
        change: real(h.user, "USD", dec!(5)),
        operational_group_id: deposit.group_id,
        operational_type_id: withdrawal.type_id,
    };
    let err = h.ledger.update(mismatched).await.unwrap_err();
    assert!(matches!(err, LedgerError::UnknownOperationalType(_)));
    assert_eq!(h.store.balance_count(), 0);
}

#[tokio::test]
async fn test_update_reverts_balance_when_log_write_fails() {
    let h = harness();
    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();
    let req = update_request(&h, groups::DEPOSIT, dec!(5)).await;
    h.store.fail_next(FailPoint::AppendLog);

    let err = h.ledger.update(req).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Reverted { operation: "update", failed_step: SagaStep::LogWrite, .. }
    ));
    assert_eq!(real_money(&h, "USD").await, dec!(10));
    assert!(h.store.all_logs().is_empty());
}

#[tokio::test]
async fn test_update_reports_failed_compensation() {
    let h = harness();
    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();
    let req = update_request(&h, groups::DEPOSIT, dec!(5)).await;
    h.store.fail_next(FailPoint::AppendLog);
    // The credit is the first set_amount, the restore the second.
    h.store.fail_nth(FailPoint::SetAmount, 2);

    let err = h.ledger.update(req).await.unwrap_err();
    assert!(matches!(err, LedgerError::CompensationFailed { operation: "update", .. }));
    assert_eq!(err.http_status_code(), 500);
}

// ============================================================================
// Exchange
// ============================================================================

#[tokio::test]
async fn test_deposit_withdraw_exchange_walkthrough() {
    let h = harness();
    h.store.set_rate(code("USD"), code("EUR"), dec!(0.9));

    h.ledger.deposit(real(h.user, "USD", dec!(100))).await.unwrap();
    h.ledger.withdraw(real(h.user, "USD", dec!(30))).await.unwrap();
    let out = h
        .ledger
        .exchange(ExchangeRequest {
            user_id: h.user,
            currency_from: "USD".to_string(),
            currency_to: "EUR".to_string(),
            amount: dec!(50),
        })
        .await
        .unwrap();

    assert_eq!(out.exchanged_amount, dec!(45));
    assert_eq!(out.from_balance, dec!(20));
    assert_eq!(out.to_balance, dec!(45));
    assert_eq!(real_money(&h, "USD").await, dec!(20));
    assert_eq!(real_money(&h, "EUR").await, dec!(45));

    let logs = h.store.all_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].currency, code("EUR"));
    assert_eq!(logs[0].change_amount, dec!(45));
    assert_eq!(logs[0].balance_after_update, Some(dec!(45)));

    let (groups_count, types_count) = h.store.taxonomy_counts();
    assert_eq!((groups_count, types_count), (1, 1));
    let tag = tag(&h, groups::TRANSFER, op_types::INTERNAL_TRANSACTION).await;
    assert_eq!(logs[0].operational_type_id, tag.type_id);
}

#[tokio::test]
async fn test_exchange_rounds_to_target_minor_units() {
    let h = harness();
    h.store.set_rate(code("USD"), code("JPY"), dec!(150.45));
    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();

    let out = h
        .ledger
        .exchange(ExchangeRequest {
            user_id: h.user,
            currency_from: "USD".to_string(),
            currency_to: "JPY".to_string(),
            amount: dec!(10),
        })
        .await
        .unwrap();
    assert_eq!(out.exchanged_amount, dec!(1504));
    assert_eq!(out.from_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_exchange_rounding_to_zero_is_rejected() {
    let h = harness();
    h.store.set_rate(code("USD"), code("JPY"), dec!(40));
    h.ledger.deposit(real(h.user, "USD", dec!(1))).await.unwrap();

    let err = h
        .ledger
        .exchange(ExchangeRequest {
            user_id: h.user,
            currency_from: "USD".to_string(),
            currency_to: "JPY".to_string(),
            amount: dec!(0.01),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ExchangeAmountTooSmall { .. }));
    assert_eq!(err.http_status_code(), 400);
    assert_eq!(real_money(&h, "USD").await, dec!(1));
    assert!(h.ledger.get_balance(h.user, "JPY").await.is_err());
    assert!(h.store.all_logs().is_empty());
}

#[tokio::test]
async fn test_exchange_past_column_limit_is_rejected() {
    let h = harness();
    let max = CurrencyService::MAX_AMOUNT.trunc();
    h.store.set_rate(code("USD"), code("EUR"), dec!(1));
    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();
    h.ledger.deposit(real(h.user, "EUR", max)).await.unwrap();

    let err = h
        .ledger
        .exchange(ExchangeRequest {
            user_id: h.user,
            currency_from: "USD".to_string(),
            currency_to: "EUR".to_string(),
            amount: dec!(10),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AmountOverflow { .. }));
    assert_eq!(real_money(&h, "USD").await, dec!(10));
    assert_eq!(real_money(&h, "EUR").await, max);
    assert!(h.store.all_logs().is_empty());
}

#[tokio::test]
async fn test_exchange_precondition_failures_write_nothing() {
    let h = harness();
    let exchange = |from: &str, to: &str, amount: Decimal| ExchangeRequest {
        user_id: h.user,
        currency_from: from.to_string(),
        currency_to: to.to_string(),
        amount,
    };

    let same = h.ledger.exchange(exchange("USD", "usd", dec!(1))).await;
    assert!(matches!(same, Err(LedgerError::SameCurrencyExchange)));

    let no_balance = h.ledger.exchange(exchange("USD", "EUR", dec!(1))).await;
    assert!(matches!(no_balance, Err(LedgerError::NoBalance { .. })));

    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();
    let too_much = h.ledger.exchange(exchange("USD", "EUR", dec!(11))).await;
    assert!(matches!(too_much, Err(LedgerError::InsufficientFunds { .. })));

    let no_rate = h.ledger.exchange(exchange("USD", "EUR", dec!(1))).await;
    assert!(matches!(no_rate, Err(LedgerError::NoExchangeRate { .. })));

    h.store.set_rate(code("USD"), code("EUR"), Decimal::ZERO);
    let zero_rate = h.ledger.exchange(exchange("USD", "EUR", dec!(1))).await;
    assert!(matches!(zero_rate, Err(LedgerError::InvalidExchangeRate { .. })));

    assert_eq!(real_money(&h, "USD").await, dec!(10));
    assert!(h.ledger.get_balance(h.user, "EUR").await.is_err());
    assert!(h.store.all_logs().is_empty());
}

#[tokio::test]
async fn test_exchange_undoes_credit_when_debit_fails() {
    let h = harness();
    h.store.set_rate(code("USD"), code("EUR"), dec!(0.5));
    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();
    h.ledger.deposit(real(h.user, "EUR", dec!(3))).await.unwrap();
    // Credit to EUR is the first set_amount, debit from USD the second.
    h.store.fail_nth(FailPoint::SetAmount, 2);

    let err = h
        .ledger
        .exchange(ExchangeRequest {
            user_id: h.user,
            currency_from: "USD".to_string(),
            currency_to: "EUR".to_string(),
            amount: dec!(4),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Reverted { failed_step: SagaStep::BalanceUpdate, .. }
    ));
    assert_eq!(real_money(&h, "USD").await, dec!(10));
    assert_eq!(real_money(&h, "EUR").await, dec!(3));
}

#[tokio::test]
async fn test_exchange_undoes_both_sides_when_log_fails() {
    let h = harness();
    h.store.set_rate(code("USD"), code("EUR"), dec!(0.5));
    h.ledger.deposit(real(h.user, "USD", dec!(10))).await.unwrap();
    h.store.fail_next(FailPoint::AppendLog);

    let err = h
        .ledger
        .exchange(ExchangeRequest {
            user_id: h.user,
            currency_from: "USD".to_string(),
            currency_to: "EUR".to_string(),
            amount: dec!(4),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Reverted { operation: "exchange", failed_step: SagaStep::LogWrite, .. }
    ));
    assert_eq!(real_money(&h, "USD").await, dec!(10));
    assert_eq!(real_money(&h, "EUR").await, Decimal::ZERO);
    assert!(h.store.all_logs().is_empty());
}

// ============================================================================
// Wallet credit
// ============================================================================

#[tokio::test]
async fn test_credit_wallet_is_idempotent_per_reference() {
    let h = harness();
    assert!(h.ledger.is_payment_reference_unique("pay_1").await.unwrap());

    let out = h
        .ledger
        .credit_wallet(wallet_credit(h.user, dec!(25), "pay_1"))
        .await
        .unwrap();
    assert_eq!(out.new_balance, dec!(25));
    assert_eq!(out.transaction_id, "pay_1");
    assert!(!h.ledger.is_payment_reference_unique("pay_1").await.unwrap());

    let err = h
        .ledger
        .credit_wallet(wallet_credit(h.user, dec!(25), "pay_1"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicatePaymentReference(ref r) if r == "pay_1"));
    assert_eq!(err.http_status_code(), 409);
    assert_eq!(real_money(&h, "USD").await, dec!(25));

    let logs = h.store.all_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].description.contains("stripe"));
    assert!(logs[0].description.contains("pay_1"));
}

#[tokio::test]
async fn test_credit_wallet_requires_reference() {
    let h = harness();
    let err = h
        .ledger
        .credit_wallet(wallet_credit(h.user, dec!(5), "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::MissingField("payment reference")));
}

#[tokio::test]
async fn test_credit_wallet_reverts_when_log_fails() {
    let h = harness();
    h.ledger.deposit(real(h.user, "USD", dec!(5))).await.unwrap();
    h.store.fail_next(FailPoint::AppendLog);

    let err = h
        .ledger
        .credit_wallet(wallet_credit(h.user, dec!(20), "pay_2"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Reverted { operation: "credit_wallet", .. }));
    assert_eq!(real_money(&h, "USD").await, dec!(5));
    assert!(h.ledger.is_payment_reference_unique("pay_2").await.unwrap());

    // A retry with the same reference goes through.
    let out = h
        .ledger
        .credit_wallet(wallet_credit(h.user, dec!(20), "pay_2"))
        .await
        .unwrap();
    assert_eq!(out.new_balance, dec!(25));
}

#[tokio::test]
async fn test_credit_wallet_lost_race_on_log_key_is_duplicate() {
    let h = harness_with(LedgerConfig::default(), |mut deps, store| {
        deps.logs = Arc::new(BlindLookup(store.clone()));
        deps
    });

    h.ledger
        .credit_wallet(wallet_credit(h.user, dec!(10), "pay_3"))
        .await
        .unwrap();
    let err = h
        .ledger
        .credit_wallet(wallet_credit(h.user, dec!(10), "pay_3"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicatePaymentReference(_)));
    assert_eq!(real_money(&h, "USD").await, dec!(10));
}

// ============================================================================
// Manual funds
// ============================================================================

#[tokio::test]
async fn test_add_manual_funds_writes_record_and_log() {
    let h = harness();
    let out = h.ledger.add_manual_funds(manual(&h, dec!(30), "USD")).await.unwrap();

    assert_eq!(out.new_balance, dec!(30));
    assert!(!out.audit_gap);
    assert_eq!(out.record.fund_type, ManualFundType::AddFund);
    assert_eq!(out.record.note, "goodwill");
    assert_eq!(
        out.trace,
        vec![
            SagaState::Validated,
            SagaState::BalanceUpdated,
            SagaState::LogWritten,
            SagaState::SideRecordWritten,
            SagaState::Committed,
        ]
    );

    let logs = h.store.all_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(out.record.transaction_id, logs[0].transaction_id);
    assert_eq!(logs[0].description, "goodwill");
    assert_eq!(h.store.all_manual_funds().len(), 1);
}

#[tokio::test]
async fn test_manual_funds_default_currency() {
    let h = harness();
    let out = h.ledger.add_manual_funds(manual(&h, dec!(7), "")).await.unwrap();
    assert_eq!(out.record.currency, code("P"));
    assert_eq!(real_money(&h, "P").await, dec!(7));
}

#[tokio::test]
async fn test_remove_manual_funds_checks_balance() {
    let h = harness();
    let err = h
        .ledger
        .remove_manual_funds(manual(&h, dec!(5), "USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoBalance { .. }));

    h.ledger.deposit(real(h.user, "USD", dec!(8))).await.unwrap();
    let err = h
        .ledger
        .remove_manual_funds(manual(&h, dec!(9), "USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    let out = h
        .ledger
        .remove_manual_funds(manual(&h, dec!(8), "USD"))
        .await
        .unwrap();
    assert_eq!(out.new_balance, Decimal::ZERO);
    assert_eq!(out.record.fund_type, ManualFundType::RemoveFund);
    assert_eq!(h.store.all_manual_funds().len(), 1);
}

#[tokio::test]
async fn test_manual_funds_validation() {
    let h = harness();
    let mut req = manual(&h, dec!(5), "USD");
    req.reason = " ".to_string();
    let err = h.ledger.add_manual_funds(req).await.unwrap_err();
    assert!(matches!(err, LedgerError::MissingField("reason")));

    let mut req = manual(&h, dec!(5), "USD");
    req.user_id = UserId::new();
    let err = h.ledger.add_manual_funds(req).await.unwrap_err();
    assert!(matches!(err, LedgerError::UserNotFound(_)));

    let mut req = manual(&h, dec!(5), "USD");
    req.admin_id = UserId::new();
    let err = h.ledger.add_manual_funds(req).await.unwrap_err();
    assert!(matches!(err, LedgerError::AdminNotFound(_)));

    assert_eq!(h.store.balance_count(), 0);
    assert!(h.store.all_manual_funds().is_empty());
}

#[tokio::test]
async fn test_add_manual_funds_respects_funding_limit() {
    let h = harness_with(LedgerConfig::default(), |deps, store| {
        deps.with_funding_limits(store.clone())
    });
    h.store.set_funding_limit(h.admin, Some(dec!(100)));

    let err = h
        .ledger
        .add_manual_funds(manual(&h, dec!(100.01), "USD"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::FundingLimitExceeded { limit, .. } if limit == dec!(100)
    ));
    assert_eq!(h.store.balance_count(), 0);
    assert!(h.store.all_logs().is_empty());
    assert!(h.store.all_manual_funds().is_empty());

    h.ledger.add_manual_funds(manual(&h, dec!(100), "USD")).await.unwrap();

    // A failed limit lookup does not block funding.
    h.store.fail_next(FailPoint::FundingLimit);
    h.ledger.add_manual_funds(manual(&h, dec!(500), "USD")).await.unwrap();
    assert_eq!(real_money(&h, "USD").await, dec!(600));
}

#[tokio::test]
async fn test_manual_funds_log_failure_keeps_balance_and_flags_gap() {
    let h = harness();
    h.store.fail_next(FailPoint::AppendLog);

    let out = h.ledger.add_manual_funds(manual(&h, dec!(12), "USD")).await.unwrap();
    assert!(out.audit_gap);
    assert_eq!(out.record.transaction_id, None);
    assert_eq!(
        out.trace,
        vec![
            SagaState::Validated,
            SagaState::BalanceUpdated,
            SagaState::SideRecordWritten,
            SagaState::Committed,
        ]
    );
    assert_eq!(real_money(&h, "USD").await, dec!(12));
    assert!(h.store.all_logs().is_empty());
    assert_eq!(h.store.all_manual_funds().len(), 1);
}

#[tokio::test]
async fn test_manual_funds_record_failure_reverts_balance_and_log() {
    let h = harness();
    h.ledger.deposit(real(h.user, "USD", dec!(20))).await.unwrap();
    h.store.fail_next(FailPoint::SaveManualFund);

    let err = h
        .ledger
        .remove_manual_funds(manual(&h, dec!(5), "USD"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Reverted {
            operation: "manual_fund_remove",
            failed_step: SagaStep::SideRecordWrite,
            ..
        }
    ));
    assert_eq!(real_money(&h, "USD").await, dec!(20));
    assert!(h.store.all_logs().is_empty());
    assert!(h.store.all_manual_funds().is_empty());
}

#[tokio::test]
async fn test_manual_funds_failed_log_delete_is_compensation_failure() {
    let h = harness();
    h.store.fail_next(FailPoint::SaveManualFund);
    h.store.fail_next(FailPoint::DeleteLog);

    let err = h
        .ledger
        .add_manual_funds(manual(&h, dec!(5), "USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CompensationFailed { operation: "manual_fund_add", .. }));
    // The balance restore ran before the log delete.
    assert_eq!(real_money(&h, "USD").await, Decimal::ZERO);
    assert_eq!(h.store.all_logs().len(), 1);
}

// ============================================================================
// Notifier
// ============================================================================

#[tokio::test]
async fn test_notifier_sees_credits_only() {
    let notifier = Arc::new(RecordingNotifier::default());
    let hook = notifier.clone();
    let h = harness_with(LedgerConfig::default(), move |deps, _| deps.with_notifier(hook));

    h.ledger
        .update(update_request(&h, groups::DEPOSIT, dec!(10)).await)
        .await
        .unwrap();
    h.ledger
        .update(update_request(&h, groups::WITHDRAWAL, dec!(4)).await)
        .await
        .unwrap();
    h.ledger
        .credit_wallet(wallet_credit(h.user, dec!(3), "pay_n"))
        .await
        .unwrap();
    h.ledger.add_manual_funds(manual(&h, dec!(2), "USD")).await.unwrap();
    h.ledger.remove_manual_funds(manual(&h, dec!(1), "USD")).await.unwrap();

    let events = notifier.events();
    let amounts: Vec<Decimal> = events.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![dec!(10), dec!(3), dec!(2)]);
    assert_eq!(events[1].operational_type, op_types::ADD_FUND);
    assert_eq!(events[2].operational_type, op_types::ADD_FUND);
}

#[tokio::test]
async fn test_notifier_failure_does_not_fail_operation() {
    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });
    let hook = notifier.clone();
    let h = harness_with(LedgerConfig::default(), move |deps, _| deps.with_notifier(hook));

    let out = h
        .ledger
        .credit_wallet(wallet_credit(h.user, dec!(3), "pay_f"))
        .await
        .unwrap();
    assert_eq!(out.new_balance, dec!(3));
    assert_eq!(notifier.events().len(), 1);
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_balance_log_queries_paginate_newest_first() {
    let h = harness();
    for amount in [dec!(1), dec!(2), dec!(3)] {
        h.ledger
            .update(update_request(&h, groups::DEPOSIT, amount).await)
            .await
            .unwrap();
    }

    let query = BalanceLogQuery {
        user_id: Some(h.user),
        ..Default::default()
    };
    let page = h
        .ledger
        .get_balance_logs(query.clone(), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.meta.total, 3);
    assert_eq!(page.meta.total_pages, 2);
    assert!(page.data[0].timestamp >= page.data[1].timestamp);

    let ranged = BalanceLogQuery {
        min_amount: Some(dec!(2)),
        ..query
    };
    let page = h
        .ledger
        .get_balance_logs(ranged, PageRequest::new(0, 0))
        .await
        .unwrap();
    assert_eq!(page.meta.total, 2);
    assert_eq!(page.meta.page, 1);
    assert_eq!(page.meta.per_page, 10);

    let one = h.ledger.get_balance_log(page.data[0].id).await.unwrap();
    assert_eq!(one, page.data[0]);
}

#[tokio::test]
async fn test_balance_log_sort_options() {
    let h = harness();
    for amount in [dec!(3), dec!(1), dec!(2)] {
        h.ledger
            .update(update_request(&h, groups::DEPOSIT, amount).await)
            .await
            .unwrap();
    }

    let ascending = BalanceLogQuery {
        user_id: Some(h.user),
        sort_amount: Some("asc".to_string()),
        ..Default::default()
    };
    let page = h
        .ledger
        .get_balance_logs(ascending, PageRequest::default())
        .await
        .unwrap();
    let amounts: Vec<_> = page.data.iter().map(|l| l.change_amount).collect();
    assert_eq!(amounts, vec![dec!(1), dec!(2), dec!(3)]);

    let oldest_first = BalanceLogQuery {
        sort_date: Some("ASC".to_string()),
        ..Default::default()
    };
    let page = h
        .ledger
        .get_balance_logs(oldest_first, PageRequest::default())
        .await
        .unwrap();
    assert!(page.data.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let bad = BalanceLogQuery {
        sort_amount: Some("sideways".to_string()),
        ..Default::default()
    };
    let err = h
        .ledger
        .get_balance_logs(bad, PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidSortOption { field: "amount", .. }));
    assert_eq!(err.http_status_code(), 400);
}

#[tokio::test]
async fn test_manual_fund_sort_options() {
    let h = harness();
    let other_admin = UserId::new();
    h.store.add_user(other_admin, "zoe");
    h.ledger.add_manual_funds(manual(&h, dec!(10), "USD")).await.unwrap();
    let mut req = manual(&h, dec!(4), "USD");
    req.admin_id = other_admin;
    h.ledger.add_manual_funds(req).await.unwrap();
    h.ledger.add_manual_funds(manual(&h, dec!(7), "USD")).await.unwrap();

    let by_amount = h
        .ledger
        .list_manual_funds(
            ManualFundQuery {
                sort_amount: Some("asc".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    let amounts: Vec<_> = by_amount.data.iter().map(|r| r.amount).collect();
    assert_eq!(amounts, vec![dec!(4), dec!(7), dec!(10)]);

    let by_admin = h
        .ledger
        .list_manual_funds(
            ManualFundQuery {
                sort_admin: Some("desc".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_admin.data[0].admin_id, other_admin);
    assert!(by_admin.data[1..].iter().all(|r| r.admin_id == h.admin));

    let err = h
        .ledger
        .list_manual_funds(
            ManualFundQuery {
                sort_date: Some("newest".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidSortOption { field: "date", .. }));
}

#[tokio::test]
async fn test_query_errors() {
    let h = harness();
    let bad_component = BalanceLogQuery {
        component: Some("chips".to_string()),
        ..Default::default()
    };
    let err = h
        .ledger
        .get_balance_logs(bad_component, PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownComponent(_)));

    let nil = h.ledger.get_balance_log(BalanceLogId::nil()).await;
    assert!(matches!(nil, Err(LedgerError::InvalidId("balance log id"))));

    let missing = h.ledger.get_balance_log(BalanceLogId::new()).await;
    assert!(matches!(missing, Err(LedgerError::BalanceLogNotFound(_))));

    let rate = h.ledger.get_exchange_rate("USD", "EUR").await;
    assert!(matches!(rate, Err(LedgerError::NoExchangeRate { .. })));

    assert!(h.ledger.get_balances(h.user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_manual_funds_filters_by_type() {
    let h = harness();
    h.ledger.add_manual_funds(manual(&h, dec!(10), "USD")).await.unwrap();
    h.ledger.add_manual_funds(manual(&h, dec!(5), "USD")).await.unwrap();
    h.ledger.remove_manual_funds(manual(&h, dec!(3), "USD")).await.unwrap();

    let removals = h
        .ledger
        .list_manual_funds(
            ManualFundQuery {
                fund_type: Some(ManualFundType::RemoveFund),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(removals.meta.total, 1);
    assert_eq!(removals.data[0].amount, dec!(3));

    let by_admin = h
        .ledger
        .list_manual_funds(
            ManualFundQuery {
                admin_id: Some(h.admin),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_admin.meta.total, 3);
    assert_eq!(h.ledger.get_balances(h.user).await.unwrap().len(), 1);
}
