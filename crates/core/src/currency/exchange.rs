//! Exchange rate types.

use chrono::{DateTime, Utc};
use coffer_shared::types::{CurrencyCode, ExchangeRateId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange rate between two currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Row identifier.
    pub id: ExchangeRateId,
    /// Source currency code.
    pub currency_from: CurrencyCode,
    /// Target currency code.
    pub currency_to: CurrencyCode,
    /// Exchange rate (1 currency_from = rate currency_to).
    pub rate: Decimal,
    /// Last time the rate was set.
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRate {
    /// Creates a new exchange rate.
    #[must_use]
    pub fn new(currency_from: CurrencyCode, currency_to: CurrencyCode, rate: Decimal) -> Self {
        Self {
            id: ExchangeRateId::new(),
            currency_from,
            currency_to,
            rate,
            updated_at: Utc::now(),
        }
    }

    /// Returns true if the rate can be applied.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.rate > Decimal::ZERO
    }
}
