//! Currency validation, exchange rates and conversion.

pub mod exchange;
pub mod service;

#[cfg(test)]
mod props;

pub use exchange::ExchangeRate;
pub use service::CurrencyService;
