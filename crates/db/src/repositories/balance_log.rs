//! Balance log repository: the append-only audit trail.

use async_trait::async_trait;
use chrono::Utc;
use coffer_core::ledger::{BalanceLog, BalanceLogFilter, Component, LogStatus};
use coffer_core::storage::{BalanceLogStore, StorageResult};
use coffer_shared::types::{
    BalanceLogId, CurrencyCode, OperationalGroupId, OperationalTypeId, PageRequest, UserId,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};

use super::sort_order;
use crate::entities::balance_logs;
use crate::error::{corrupt, storage_err};

const ENTITY: &str = "balance_log";

/// Balance log repository backed by the `balance_logs` table.
#[derive(Debug, Clone)]
pub struct BalanceLogRepository {
    db: DatabaseConnection,
}

impl BalanceLogRepository {
    /// Creates a new balance log repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_domain(model: balance_logs::Model) -> StorageResult<BalanceLog> {
    let component = model
        .component
        .parse::<Component>()
        .map_err(|_| corrupt(ENTITY, "component", &model.component))?;
    let currency = CurrencyCode::parse(&model.currency_code)
        .map_err(|_| corrupt(ENTITY, "currency_code", &model.currency_code))?;
    if model.status != LogStatus::Completed.as_str() {
        return Err(corrupt(ENTITY, "status", &model.status));
    }
    Ok(BalanceLog {
        id: BalanceLogId::from_uuid(model.id),
        user_id: UserId::from_uuid(model.user_id),
        component,
        currency,
        description: model.description,
        change_amount: model.change_amount,
        operational_group_id: OperationalGroupId::from_uuid(model.operational_group_id),
        operational_type_id: OperationalTypeId::from_uuid(model.operational_type_id),
        balance_after_update: model.balance_after_update,
        transaction_id: model.transaction_id,
        status: LogStatus::Completed,
        timestamp: model.timestamp.with_timezone(&Utc),
    })
}

fn condition(filter: &BalanceLogFilter) -> Condition {
    Condition::all()
        .add_option(
            filter
                .user_id
                .map(|id| balance_logs::Column::UserId.eq(id.into_inner())),
        )
        .add_option(
            filter
                .component
                .map(|c| balance_logs::Column::Component.eq(c.as_str())),
        )
        .add_option(
            filter
                .operational_group_id
                .map(|id| balance_logs::Column::OperationalGroupId.eq(id.into_inner())),
        )
        .add_option(
            filter
                .operational_type_id
                .map(|id| balance_logs::Column::OperationalTypeId.eq(id.into_inner())),
        )
        .add_option(
            filter
                .start_date
                .map(|d| balance_logs::Column::Timestamp.gte(d)),
        )
        .add_option(filter.end_date.map(|d| balance_logs::Column::Timestamp.lte(d)))
        .add_option(
            filter
                .min_amount
                .map(|a| balance_logs::Column::ChangeAmount.gte(a)),
        )
        .add_option(
            filter
                .max_amount
                .map(|a| balance_logs::Column::ChangeAmount.lte(a)),
        )
}

#[async_trait]
impl BalanceLogStore for BalanceLogRepository {
    async fn append_log(&self, log: BalanceLog) -> StorageResult<BalanceLog> {
        let key = log
            .transaction_id
            .clone()
            .unwrap_or_else(|| log.id.to_string());
        let model = balance_logs::ActiveModel {
            id: Set(log.id.into_inner()),
            user_id: Set(log.user_id.into_inner()),
            component: Set(log.component.as_str().to_string()),
            currency_code: Set(log.currency.to_string()),
            description: Set(log.description),
            change_amount: Set(log.change_amount),
            operational_group_id: Set(log.operational_group_id.into_inner()),
            operational_type_id: Set(log.operational_type_id.into_inner()),
            balance_after_update: Set(log.balance_after_update),
            transaction_id: Set(log.transaction_id),
            status: Set(log.status.as_str().to_string()),
            timestamp: Set(log.timestamp.into()),
        };
        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, key, e))?;
        to_domain(inserted)
    }

    async fn get_log(&self, id: BalanceLogId) -> StorageResult<Option<BalanceLog>> {
        balance_logs::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, id.to_string(), e))?
            .map(to_domain)
            .transpose()
    }

    async fn get_log_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StorageResult<Option<BalanceLog>> {
        balance_logs::Entity::find()
            .filter(balance_logs::Column::TransactionId.eq(transaction_id))
            .one(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, transaction_id, e))?
            .map(to_domain)
            .transpose()
    }

    async fn delete_log(&self, id: BalanceLogId) -> StorageResult<()> {
        let result = balance_logs::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, id.to_string(), e))?;
        tracing::debug!(log_id = %id, rows = result.rows_affected, "balance log deleted");
        Ok(())
    }

    async fn query_logs(
        &self,
        filter: &BalanceLogFilter,
        page: PageRequest,
    ) -> StorageResult<(Vec<BalanceLog>, u64)> {
        let mut select = balance_logs::Entity::find().filter(condition(filter));
        if let Some(direction) = filter.sort.amount {
            select = select.order_by(balance_logs::Column::ChangeAmount, sort_order(direction));
        }
        if let Some(direction) = filter.sort.date {
            select = select.order_by(balance_logs::Column::Timestamp, sort_order(direction));
        }
        let paginator = select
            .order_by_desc(balance_logs::Column::Timestamp)
            .order_by_desc(balance_logs::Column::Id)
            .paginate(&self.db, page.limit());

        let total = paginator
            .num_items()
            .await
            .map_err(|e| storage_err(ENTITY, "query", e))?;
        let rows = paginator
            .fetch_page(u64::from(page.page.saturating_sub(1)))
            .await
            .map_err(|e| storage_err(ENTITY, "query", e))?;

        let logs = rows
            .into_iter()
            .map(to_domain)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok((logs, total))
    }
}
