//! Balance repository: one row per (user, currency).

use async_trait::async_trait;
use chrono::Utc;
use coffer_core::ledger::{Balance, Component};
use coffer_core::storage::{BalanceStore, StorageError, StorageResult};
use coffer_shared::types::{BalanceId, CurrencyCode, UserId};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::balances;
use crate::error::{corrupt, storage_err};

const ENTITY: &str = "balance";

/// Balance repository backed by the `balances` table.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    db: DatabaseConnection,
}

impl BalanceRepository {
    /// Creates a new balance repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn key(user_id: UserId, currency: &CurrencyCode) -> String {
    format!("{user_id}/{currency}")
}

fn to_domain(model: balances::Model) -> StorageResult<Balance> {
    let currency = CurrencyCode::parse(&model.currency_code)
        .map_err(|_| corrupt(ENTITY, "currency_code", &model.currency_code))?;
    Ok(Balance {
        id: BalanceId::from_uuid(model.id),
        user_id: UserId::from_uuid(model.user_id),
        currency,
        real_money: model.real_money,
        bonus_money: model.bonus_money,
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

const fn column_for(component: Component) -> balances::Column {
    match component {
        Component::RealMoney => balances::Column::RealMoney,
        Component::BonusMoney => balances::Column::BonusMoney,
    }
}

#[async_trait]
impl BalanceStore for BalanceRepository {
    async fn get_balance(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
    ) -> StorageResult<Option<Balance>> {
        balances::Entity::find()
            .filter(balances::Column::UserId.eq(user_id.into_inner()))
            .filter(balances::Column::CurrencyCode.eq(currency.as_str()))
            .one(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, key(user_id, currency), e))?
            .map(to_domain)
            .transpose()
    }

    async fn list_balances(&self, user_id: UserId) -> StorageResult<Vec<Balance>> {
        balances::Entity::find()
            .filter(balances::Column::UserId.eq(user_id.into_inner()))
            .order_by_asc(balances::Column::CurrencyCode)
            .all(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, user_id.to_string(), e))?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn create_balance(&self, balance: Balance) -> StorageResult<Balance> {
        let row_key = key(balance.user_id, &balance.currency);
        let model = balances::ActiveModel {
            id: Set(balance.id.into_inner()),
            user_id: Set(balance.user_id.into_inner()),
            currency_code: Set(balance.currency.to_string()),
            real_money: Set(balance.real_money),
            bonus_money: Set(balance.bonus_money),
            updated_at: Set(balance.updated_at.into()),
        };
        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, row_key, e))?;
        to_domain(inserted)
    }

    async fn set_amount(
        &self,
        user_id: UserId,
        currency: &CurrencyCode,
        component: Component,
        value: Decimal,
    ) -> StorageResult<Balance> {
        let row_key = key(user_id, currency);
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let updated = balances::Entity::update_many()
            .col_expr(column_for(component), Expr::value(value))
            .col_expr(balances::Column::UpdatedAt, Expr::value(now))
            .filter(balances::Column::UserId.eq(user_id.into_inner()))
            .filter(balances::Column::CurrencyCode.eq(currency.as_str()))
            .exec_with_returning(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, row_key.clone(), e))?;

        let Some(model) = updated.into_iter().next() else {
            return Err(StorageError::not_found(ENTITY, row_key));
        };
        tracing::trace!(
            user_id = %user_id,
            currency = %currency,
            component = %component,
            value = %value,
            "balance component set"
        );
        to_domain(model)
    }
}
