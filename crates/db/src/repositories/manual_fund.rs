//! Manual fund repository: records of administrator adjustments.

use async_trait::async_trait;
use chrono::Utc;
use coffer_core::ledger::{ManualFundFilter, ManualFundRecord, ManualFundType};
use coffer_core::storage::{ManualFundStore, StorageResult};
use coffer_shared::types::{CurrencyCode, ManualFundId, PageRequest, UserId};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};

use super::sort_order;
use crate::entities::{manual_funds, users};
use crate::error::{corrupt, storage_err};

const ENTITY: &str = "manual_fund";

/// Manual fund repository backed by the `manual_funds` table.
#[derive(Debug, Clone)]
pub struct ManualFundRepository {
    db: DatabaseConnection,
}

impl ManualFundRepository {
    /// Creates a new manual fund repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_domain(model: manual_funds::Model) -> StorageResult<ManualFundRecord> {
    let fund_type = model
        .fund_type
        .parse::<ManualFundType>()
        .map_err(|_| corrupt(ENTITY, "fund_type", &model.fund_type))?;
    let currency = CurrencyCode::parse(&model.currency_code)
        .map_err(|_| corrupt(ENTITY, "currency_code", &model.currency_code))?;
    Ok(ManualFundRecord {
        id: ManualFundId::from_uuid(model.id),
        user_id: UserId::from_uuid(model.user_id),
        admin_id: UserId::from_uuid(model.admin_id),
        transaction_id: model.transaction_id,
        fund_type,
        amount: model.amount,
        reason: model.reason,
        currency,
        note: model.note,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn condition(filter: &ManualFundFilter) -> Condition {
    Condition::all()
        .add_option(
            filter
                .user_id
                .map(|id| manual_funds::Column::UserId.eq(id.into_inner())),
        )
        .add_option(
            filter
                .admin_id
                .map(|id| manual_funds::Column::AdminId.eq(id.into_inner())),
        )
        .add_option(
            filter
                .fund_type
                .map(|t| manual_funds::Column::FundType.eq(t.as_str())),
        )
        .add_option(
            filter
                .start_date
                .map(|d| manual_funds::Column::CreatedAt.gte(d)),
        )
        .add_option(filter.end_date.map(|d| manual_funds::Column::CreatedAt.lte(d)))
}

#[async_trait]
impl ManualFundStore for ManualFundRepository {
    async fn save_manual_fund(&self, record: ManualFundRecord) -> StorageResult<ManualFundRecord> {
        let key = record.id.to_string();
        let model = manual_funds::ActiveModel {
            id: Set(record.id.into_inner()),
            user_id: Set(record.user_id.into_inner()),
            admin_id: Set(record.admin_id.into_inner()),
            transaction_id: Set(record.transaction_id),
            fund_type: Set(record.fund_type.as_str().to_string()),
            amount: Set(record.amount),
            reason: Set(record.reason),
            currency_code: Set(record.currency.to_string()),
            note: Set(record.note),
            created_at: Set(record.created_at.into()),
        };
        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, key, e))?;
        to_domain(inserted)
    }

    async fn list_manual_funds(
        &self,
        filter: &ManualFundFilter,
        page: PageRequest,
    ) -> StorageResult<(Vec<ManualFundRecord>, u64)> {
        let sort = filter.sort;
        let mut select = manual_funds::Entity::find().filter(condition(filter));
        if let Some(direction) = sort.date {
            select = select.order_by(manual_funds::Column::CreatedAt, sort_order(direction));
        }
        if let Some(direction) = sort.amount {
            select = select.order_by(manual_funds::Column::Amount, sort_order(direction));
        }
        if let Some(direction) = sort.admin {
            select = select
                .join(JoinType::LeftJoin, manual_funds::Relation::Admin.def())
                .order_by(users::Column::Username, sort_order(direction));
        }
        let paginator = select
            .order_by_desc(manual_funds::Column::CreatedAt)
            .order_by_desc(manual_funds::Column::Id)
            .paginate(&self.db, page.limit());

        let total = paginator
            .num_items()
            .await
            .map_err(|e| storage_err(ENTITY, "query", e))?;
        let rows = paginator
            .fetch_page(u64::from(page.page.saturating_sub(1)))
            .await
            .map_err(|e| storage_err(ENTITY, "query", e))?;

        let records = rows
            .into_iter()
            .map(to_domain)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok((records, total))
    }
}
