//! Currency codes and their minor units.

use serde::{Deserialize, Serialize};

/// Platform virtual currency ("bucks").
pub const VIRTUAL_CURRENCY: &str = "P";

/// Active ISO 4217 alphabetic codes accepted by the ledger.
const ISO_4217_CODES: &[&str] = &[
    "AED", "AFN", "ALL", "AMD", "ANG", "AOA", "ARS", "AUD", "AWG", "AZN", "BAM", "BBD", "BDT",
    "BGN", "BHD", "BIF", "BMD", "BND", "BOB", "BOV", "BRL", "BSD", "BTN", "BWP", "BYN", "BZD",
    "CAD", "CDF", "CHE", "CHF", "CHW", "CLF", "CLP", "CNY", "COP", "COU", "CRC", "CUC", "CUP",
    "CVE", "CZK", "DJF", "DKK", "DOP", "DZD", "EGP", "ERN", "ETB", "EUR", "FJD", "FKP", "GBP",
    "GEL", "GHS", "GIP", "GMD", "GNF", "GTQ", "GYD", "HKD", "HNL", "HTG", "HUF", "IDR", "ILS",
    "INR", "IQD", "IRR", "ISK", "JMD", "JOD", "JPY", "KES", "KGS", "KHR", "KMF", "KPW", "KRW",
    "KWD", "KYD", "KZT", "LAK", "LBP", "LKR", "LRD", "LSL", "LYD", "MAD", "MDL", "MGA", "MKD",
    "MMK", "MNT", "MOP", "MRU", "MUR", "MVR", "MWK", "MXN", "MXV", "MYR", "MZN", "NAD", "NGN",
    "NIO", "NOK", "NPR", "NZD", "OMR", "PAB", "PEN", "PGK", "PHP", "PKR", "PLN", "PYG", "QAR",
    "RON", "RSD", "RUB", "RWF", "SAR", "SBD", "SCR", "SDG", "SEK", "SGD", "SHP", "SLE", "SLL",
    "SOS", "SRD", "SSP", "STN", "SVC", "SYP", "SZL", "THB", "TJS", "TMT", "TND", "TOP", "TRY",
    "TTD", "TWD", "TZS", "UAH", "UGX", "USD", "USN", "UYI", "UYU", "UYW", "UZS", "VED", "VES",
    "VND", "VUV", "WST", "XAF", "XCD", "XOF", "XPF", "YER", "ZAR", "ZMW", "ZWL",
];

/// ISO 4217 codes without a minor unit.
const ZERO_DECIMAL_CODES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "UYI", "VND",
    "VUV", "XAF", "XOF", "XPF",
];

/// ISO 4217 codes with three minor-unit digits.
const THREE_DECIMAL_CODES: &[&str] = &["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

/// ISO 4217 codes with four minor-unit digits.
const FOUR_DECIMAL_CODES: &[&str] = &["CLF", "UYW"];

/// A validated currency code.
///
/// Either the platform virtual currency `"P"` or an active ISO 4217 code.
/// Parsing normalises to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses and validates a currency code.
    ///
    /// # Errors
    ///
    /// Returns the rejected input when it is not a known code.
    pub fn parse(code: &str) -> Result<Self, String> {
        let normalized = code.trim().to_uppercase();
        if is_valid_currency(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(format!("Unknown currency: {code}"))
        }
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of minor-unit digits for this currency.
    #[must_use]
    pub fn minor_units(&self) -> u32 {
        minor_units(&self.0)
    }

    /// Returns true for the platform virtual currency.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.0 == VIRTUAL_CURRENCY
    }
}

/// Returns true if `code` is the virtual currency or an active ISO 4217 code.
///
/// The check is case-sensitive; callers normalise first.
#[must_use]
pub fn is_valid_currency(code: &str) -> bool {
    code == VIRTUAL_CURRENCY || ISO_4217_CODES.contains(&code)
}

fn minor_units(code: &str) -> u32 {
    if ZERO_DECIMAL_CODES.contains(&code) {
        0
    } else if THREE_DECIMAL_CODES.contains(&code) {
        3
    } else if FOUR_DECIMAL_CODES.contains(&code) {
        4
    } else {
        2
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
