//! User repository: existence checks and administrator funding limits.

use async_trait::async_trait;
use chrono::Utc;
use coffer_core::ledger::UserAccount;
use coffer_core::storage::{FundingLimitProvider, StorageResult, UserDirectory};
use coffer_shared::types::UserId;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::{admin_funding_limits, users};
use crate::error::storage_err;

const ENTITY: &str = "user";

/// User repository backed by `users` and `admin_funding_limits`.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    /// Creates a new user repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the user named `username`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup or insert fails.
    pub async fn ensure_user(&self, username: &str) -> StorageResult<UserAccount> {
        let existing = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, username, e))?;
        if let Some(model) = existing {
            return Ok(to_domain(model));
        }

        let model = users::ActiveModel {
            id: Set(UserId::new().into_inner()),
            username: Set(username.to_string()),
            created_at: Set(Utc::now().into()),
        };
        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, username, e))?;
        tracing::info!(user_id = %inserted.id, username, "user created");
        Ok(to_domain(inserted))
    }

    /// Sets or clears the funding ceiling of an administrator.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the administrator does not exist.
    pub async fn set_funding_limit(
        &self,
        admin_id: UserId,
        limit: Option<Decimal>,
    ) -> StorageResult<()> {
        let model = admin_funding_limits::ActiveModel {
            admin_id: Set(admin_id.into_inner()),
            limit_amount: Set(limit),
            updated_at: Set(Utc::now().into()),
        };
        admin_funding_limits::Entity::insert(model)
            .on_conflict(
                OnConflict::column(admin_funding_limits::Column::AdminId)
                    .update_columns([
                        admin_funding_limits::Column::LimitAmount,
                        admin_funding_limits::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(|e| storage_err("admin_funding_limit", admin_id.to_string(), e))?;
        Ok(())
    }
}

fn to_domain(model: users::Model) -> UserAccount {
    UserAccount {
        id: UserId::from_uuid(model.id),
        username: model.username,
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn get_user(&self, id: UserId) -> StorageResult<Option<UserAccount>> {
        let model = users::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(|e| storage_err(ENTITY, id.to_string(), e))?;
        Ok(model.map(to_domain))
    }
}

#[async_trait]
impl FundingLimitProvider for UserRepository {
    async fn funding_limit(&self, admin_id: UserId) -> StorageResult<Option<Decimal>> {
        let model = admin_funding_limits::Entity::find_by_id(admin_id.into_inner())
            .one(&self.db)
            .await
            .map_err(|e| storage_err("admin_funding_limit", admin_id.to_string(), e))?;
        Ok(model.and_then(|m| m.limit_amount))
    }
}
