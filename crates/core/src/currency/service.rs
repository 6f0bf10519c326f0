//! Currency service for validation and conversion.
//!
//! This module provides currency-code validation and conversion with
//! Banker's Rounding to the target currency's minor units.

use coffer_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

use crate::ledger::LedgerError;

/// Currency service for conversion operations.
///
/// Provides methods for converting amounts between currencies using
/// Banker's Rounding (MidpointNearestEven) strategy.
pub struct CurrencyService;

impl CurrencyService {
    /// Largest amount a `NUMERIC(20,4)` balance column holds.
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 4);

    /// Parses a caller-supplied currency code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCurrency` unless the code is `"P"` or an ISO 4217 code.
    pub fn validate(code: &str) -> Result<CurrencyCode, LedgerError> {
        CurrencyCode::parse(code).map_err(|_| LedgerError::InvalidCurrency(code.to_string()))
    }

    /// Number of decimal places amounts in `currency` round to.
    ///
    /// `scale_override` replaces the currency's own minor units when set.
    #[must_use]
    pub fn scale_for(currency: &CurrencyCode, scale_override: Option<u32>) -> u32 {
        scale_override.unwrap_or_else(|| currency.minor_units())
    }

    /// Rejects amounts with more significant decimal places than `currency` allows.
    ///
    /// Trailing zeros do not count: `1.0` is a valid JPY amount.
    ///
    /// # Errors
    ///
    /// Returns `AmountPrecision` if the amount cannot be stored without rounding.
    pub fn require_scale(
        amount: Decimal,
        currency: &CurrencyCode,
        scale_override: Option<u32>,
    ) -> Result<(), LedgerError> {
        let scale = Self::scale_for(currency, scale_override);
        if amount.normalize().scale() > scale {
            return Err(LedgerError::AmountPrecision {
                amount,
                currency: currency.to_string(),
                scale,
            });
        }
        Ok(())
    }

    /// Rejects amounts above [`Self::MAX_AMOUNT`].
    ///
    /// # Errors
    ///
    /// Returns `AmountOverflow` if the amount does not fit a balance column.
    pub fn require_in_range(amount: Decimal, currency: &CurrencyCode) -> Result<(), LedgerError> {
        if amount > Self::MAX_AMOUNT {
            return Err(LedgerError::AmountOverflow {
                amount,
                currency: currency.to_string(),
            });
        }
        Ok(())
    }

    /// Sum of two amounts, or `None` past [`Self::MAX_AMOUNT`].
    #[must_use]
    pub fn checked_total(current: Decimal, added: Decimal) -> Option<Decimal> {
        current
            .checked_add(added)
            .filter(|total| *total <= Self::MAX_AMOUNT)
    }

    /// Convert `amount` into `target` using `rate`, with Banker's Rounding.
    ///
    /// Returns `None` if the product overflows.
    ///
    /// Uses `RoundingStrategy::MidpointNearestEven` which:
    /// - Rounds 2.5 → 2 (to nearest even)
    /// - Rounds 3.5 → 4 (to nearest even)
    ///
    /// # Example
    ///
    /// ```
    /// use coffer_core::currency::CurrencyService;
    /// use coffer_shared::types::CurrencyCode;
    /// use rust_decimal_macros::dec;
    ///
    /// let jpy = CurrencyCode::parse("JPY").unwrap();
    /// assert_eq!(
    ///     CurrencyService::convert(dec!(10), dec!(150.45), &jpy, None),
    ///     Some(dec!(1504))
    /// );
    /// ```
    #[must_use]
    pub fn convert(
        amount: Decimal,
        rate: Decimal,
        target: &CurrencyCode,
        scale_override: Option<u32>,
    ) -> Option<Decimal> {
        let scale = Self::scale_for(target, scale_override);
        amount.checked_mul(rate).map(|product| Self::round(product, scale))
    }

    /// Round a decimal value using Banker's Rounding.
    #[must_use]
    pub fn round(value: Decimal, decimal_places: u32) -> Decimal {
        value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointNearestEven)
    }
}
