//! Property-based tests for currency conversion.

use coffer_shared::types::CurrencyCode;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::service::CurrencyService;

/// Strategy to generate positive decimal amounts (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate positive exchange rates (0.0001 to 10000.0000).
fn positive_rate() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

fn target_currency() -> impl Strategy<Value = CurrencyCode> {
    prop::sample::select(vec!["USD", "EUR", "JPY", "KWD", "CLF", "P"])
        .prop_map(|c| CurrencyCode::parse(c).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The converted amount never carries more decimals than the target allows.
    #[test]
    fn prop_convert_respects_target_scale(
        amount in positive_amount(),
        rate in positive_rate(),
        target in target_currency(),
    ) {
        let converted = CurrencyService::convert(amount, rate, &target, None).unwrap();
        prop_assert!(converted.scale() <= target.minor_units());
    }

    /// Rounding moves the exact product by at most half a minor unit.
    #[test]
    fn prop_convert_error_bounded(
        amount in positive_amount(),
        rate in positive_rate(),
        target in target_currency(),
    ) {
        let exact = amount * rate;
        let converted = CurrencyService::convert(amount, rate, &target, None).unwrap();
        let half_unit = Decimal::new(5, target.minor_units() + 1);
        prop_assert!((converted - exact).abs() <= half_unit);
    }

    /// Conversion is monotonic in the amount for a fixed rate.
    #[test]
    fn prop_convert_monotonic(
        a in positive_amount(),
        b in positive_amount(),
        rate in positive_rate(),
        target in target_currency(),
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            CurrencyService::convert(lo, rate, &target, None).unwrap()
                <= CurrencyService::convert(hi, rate, &target, None).unwrap()
        );
    }
}
