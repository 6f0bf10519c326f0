//! Property-based tests for LedgerService.
//!
//! - Property 1: Balance arithmetic matches the accepted operations
//! - Property 2: Balances never go negative
//! - Property 3: Exchange conserves value up to rounding
//! - Property 4: Payment references credit at most once

use std::collections::HashSet;
use std::sync::Arc;

use coffer_shared::LedgerConfig;
use coffer_shared::types::{CurrencyCode, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::error::LedgerError;
use super::service::LedgerService;
use super::types::{BalanceChangeRequest, CreditWalletRequest, ExchangeRequest};
use crate::currency::CurrencyService;
use crate::storage::{InMemoryStore, LedgerDeps};

/// Strategy to generate positive decimal amounts (0.01 to 1,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate positive exchange rates (0.0001 to 200.0000).
fn positive_rate() -> impl Strategy<Value = Decimal> {
    (1i64..2_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

/// Strategy to generate target currency codes with different minor units.
fn target_currency() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("EUR"), Just("JPY"), Just("KWD"), Just("GBP")]
}

#[derive(Debug, Clone)]
enum Op {
    Deposit(Decimal),
    Withdraw(Decimal),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        positive_amount().prop_map(Op::Deposit),
        positive_amount().prop_map(Op::Withdraw),
    ]
}

fn setup() -> (Arc<InMemoryStore>, LedgerService) {
    let store = Arc::new(InMemoryStore::new());
    let ledger =
        LedgerService::new(LedgerDeps::from_store(store.clone()), LedgerConfig::default())
            .unwrap();
    (store, ledger)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn real(user_id: UserId, currency: &str, amount: Decimal) -> BalanceChangeRequest {
    BalanceChangeRequest {
        user_id,
        currency: currency.to_string(),
        component: "real_money".to_string(),
        amount,
        description: String::new(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // =========================================================================
    // Properties 1 and 2: deposit and withdraw arithmetic
    // =========================================================================

    /// Property 1.1: The final balance equals accepted credits minus accepted debits.
    ///
    /// *For any* sequence of deposits and withdrawals, a withdrawal SHALL be
    /// accepted exactly when it fits the running balance, and the stored
    /// balance SHALL equal the running model after every step.
    #[test]
    fn prop_balance_matches_model(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let rt = runtime();
        let (_, ledger) = setup();
        let user = UserId::new();

        rt.block_on(async {
            let mut model = Decimal::ZERO;
            for op in ops {
                match op {
                    Op::Deposit(amount) => {
                        let out = ledger.deposit(real(user, "USD", amount)).await.unwrap();
                        model += amount;
                        prop_assert_eq!(out.new_balance, model);
                    }
                    Op::Withdraw(amount) => {
                        let result = ledger.withdraw(real(user, "USD", amount)).await;
                        if amount <= model {
                            model -= amount;
                            prop_assert_eq!(result.unwrap().new_balance, model);
                        } else {
                            let insufficient = matches!(
                                result,
                                Err(
                                    LedgerError::InsufficientFunds { .. }
                                        | LedgerError::NoBalance { .. }
                                )
                            );
                            prop_assert!(insufficient);
                        }
                    }
                }
                if let Ok(balance) = ledger.get_balance(user, "USD").await {
                    prop_assert!(balance.real_money >= Decimal::ZERO);
                    prop_assert_eq!(balance.real_money, model);
                    prop_assert_eq!(balance.bonus_money, Decimal::ZERO);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    // =========================================================================
    // Property 3: Exchange conservation
    // =========================================================================

    /// Property 3.1: Source decreases by the amount, target increases by the rounded conversion.
    ///
    /// *For any* funded source balance, rate and target currency, the source
    /// SHALL decrease by exactly `amount` and the target SHALL increase by
    /// `amount × rate` rounded half-to-even to the target's minor units.
    #[test]
    fn prop_exchange_conserves_value(
        funded in positive_amount(),
        amount in positive_amount(),
        rate in positive_rate(),
        to in target_currency(),
    ) {
        prop_assume!(amount <= funded);
        let rt = runtime();
        let (store, ledger) = setup();
        let user = UserId::new();
        let to_code = CurrencyCode::parse(to).unwrap();
        store.set_rate(CurrencyCode::parse("USD").unwrap(), to_code.clone(), rate);
        let expected = CurrencyService::round(amount * rate, to_code.minor_units());
        prop_assume!(expected > Decimal::ZERO);

        rt.block_on(async {
            ledger.deposit(real(user, "USD", funded)).await.unwrap();
            let out = ledger
                .exchange(ExchangeRequest {
                    user_id: user,
                    currency_from: "USD".to_string(),
                    currency_to: to.to_string(),
                    amount,
                })
                .await
                .unwrap();

            prop_assert_eq!(out.exchanged_amount, expected);
            prop_assert_eq!(out.from_balance, funded - amount);
            prop_assert_eq!(out.to_balance, expected);

            let half_unit = Decimal::new(5, to_code.minor_units() + 1);
            prop_assert!((amount * rate - out.exchanged_amount).abs() <= half_unit);
            prop_assert_eq!(store.all_logs().len(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    // =========================================================================
    // Property 4: Payment reference idempotency
    // =========================================================================

    /// Property 4.1: Each distinct reference credits exactly once.
    ///
    /// *For any* sequence of credits drawn from a small reference pool, the
    /// balance SHALL equal the amount times the number of distinct references.
    #[test]
    fn prop_references_credit_once(refs in prop::collection::vec(0u8..6, 1..20)) {
        let rt = runtime();
        let (store, ledger) = setup();
        let user = UserId::new();
        let amount = Decimal::new(1_000, 2);

        rt.block_on(async {
            let mut seen = HashSet::new();
            for r in refs {
                let result = ledger
                    .credit_wallet(CreditWalletRequest {
                        user_id: user,
                        currency: "USD".to_string(),
                        amount,
                        payment_reference: format!("ref-{r}"),
                        provider: "paypal".to_string(),
                        tx_type: "wallet".to_string(),
                    })
                    .await;
                if seen.insert(r) {
                    prop_assert!(result.is_ok());
                } else {
                    let duplicate =
                        matches!(result, Err(LedgerError::DuplicatePaymentReference(_)));
                    prop_assert!(duplicate);
                }
            }
            let balance = ledger.get_balance(user, "USD").await.unwrap();
            prop_assert_eq!(balance.real_money, amount * Decimal::from(seen.len()));
            prop_assert_eq!(store.all_logs().len(), seen.len());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
