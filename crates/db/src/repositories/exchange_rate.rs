//! Exchange rate repository and its read-through cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coffer_core::currency::ExchangeRate;
use coffer_core::storage::{ExchangeRateStore, StorageError, StorageResult};
use coffer_shared::types::{CurrencyCode, ExchangeRateId};
use moka::future::Cache;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::exchange_rates;
use crate::error::{corrupt, storage_err};

const ENTITY: &str = "exchange_rate";

/// Exchange rate repository backed by the `exchange_rates` table.
#[derive(Debug, Clone)]
pub struct ExchangeRateRepository {
    db: DatabaseConnection,
}

impl ExchangeRateRepository {
    /// Creates a new exchange rate repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates or replaces the rate for a currency pair.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the rate is not positive, the currencies
    /// are equal, or the upsert fails.
    pub async fn upsert_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        rate: Decimal,
    ) -> StorageResult<()> {
        if rate <= Decimal::ZERO || from == to {
            return Err(StorageError::backend(format!(
                "rejected exchange rate {from}->{to} = {rate}"
            )));
        }
        let model = exchange_rates::ActiveModel {
            id: Set(ExchangeRateId::new().into_inner()),
            currency_from: Set(from.to_string()),
            currency_to: Set(to.to_string()),
            rate: Set(rate),
            updated_at: Set(Utc::now().into()),
        };
        exchange_rates::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    exchange_rates::Column::CurrencyFrom,
                    exchange_rates::Column::CurrencyTo,
                ])
                .update_columns([exchange_rates::Column::Rate, exchange_rates::Column::UpdatedAt])
                .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, format!("{from}/{to}"), e))?;
        tracing::info!(from = %from, to = %to, rate = %rate, "exchange rate set");
        Ok(())
    }
}

fn to_domain(model: exchange_rates::Model) -> StorageResult<ExchangeRate> {
    let currency_from = CurrencyCode::parse(&model.currency_from)
        .map_err(|_| corrupt(ENTITY, "currency_from", &model.currency_from))?;
    let currency_to = CurrencyCode::parse(&model.currency_to)
        .map_err(|_| corrupt(ENTITY, "currency_to", &model.currency_to))?;
    Ok(ExchangeRate {
        id: ExchangeRateId::from_uuid(model.id),
        currency_from,
        currency_to,
        rate: model.rate,
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl ExchangeRateStore for ExchangeRateRepository {
    async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> StorageResult<Option<ExchangeRate>> {
        exchange_rates::Entity::find()
            .filter(exchange_rates::Column::CurrencyFrom.eq(from.as_str()))
            .filter(exchange_rates::Column::CurrencyTo.eq(to.as_str()))
            .one(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, format!("{from}/{to}"), e))?
            .map(to_domain)
            .transpose()
    }
}

/// Read-through cache in front of any exchange rate store.
///
/// Only found rates are cached, so a newly added pair is visible on the next
/// lookup; an updated rate becomes visible after the TTL or `invalidate`.
#[derive(Clone)]
pub struct CachedExchangeRates {
    inner: Arc<dyn ExchangeRateStore>,
    cache: Cache<(CurrencyCode, CurrencyCode), ExchangeRate>,
}

impl CachedExchangeRates {
    /// Wraps `inner` with a cache of `max_capacity` pairs expiring after `ttl`.
    #[must_use]
    pub fn new(inner: Arc<dyn ExchangeRateStore>, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    /// Drops the cached rate for a pair.
    pub async fn invalidate(&self, from: &CurrencyCode, to: &CurrencyCode) {
        self.cache.invalidate(&(from.clone(), to.clone())).await;
    }

    /// Number of cached pairs.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl ExchangeRateStore for CachedExchangeRates {
    async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> StorageResult<Option<ExchangeRate>> {
        let key = (from.clone(), to.clone());
        if let Some(rate) = self.cache.get(&key).await {
            tracing::trace!(from = %from, to = %to, "exchange rate cache hit");
            return Ok(Some(rate));
        }
        let rate = self.inner.get_rate(from, to).await?;
        if let Some(rate) = &rate {
            self.cache.insert(key, rate.clone()).await;
        }
        Ok(rate)
    }
}

impl std::fmt::Debug for CachedExchangeRates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedExchangeRates")
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}
